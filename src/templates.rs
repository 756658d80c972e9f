// Template views
// askama structs backing every HTML page; files live under templates/

use askama::Template;
use axum::response::Html;

use crate::error::AppResult;
use crate::models::{CommentCard, Group, PostCard, PostForm, User};
use crate::paginator::Page;

/// Render a template into an HTML body.
pub fn render<T: Template>(template: &T) -> AppResult<Html<String>> {
    Ok(Html(template.render()?))
}

/// Header navigation state. An empty username means an anonymous visitor.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub username: String,
}

impl Nav {
    pub fn new(viewer: Option<&User>) -> Self {
        Nav {
            username: viewer.map(|u| u.username.clone()).unwrap_or_default(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub nav: Nav,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListTemplate {
    pub nav: Nav,
    pub group: Group,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub nav: Nav,
    pub author: User,
    pub posts_count: usize,
    pub following: bool,
    /// False on the viewer's own profile and for anonymous visitors.
    pub show_follow: bool,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub nav: Nav,
    pub card: PostCard,
    pub posts_count: usize,
    pub comments: Vec<CommentCard>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct CreatePostTemplate {
    pub nav: Nav,
    pub is_edit: bool,
    pub action: String,
    pub form: PostForm,
    pub groups: Vec<Group>,
    pub current_image: String,
    pub error: String,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub nav: Nav,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub username: String,
    pub next: String,
    pub error: String,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub nav: Nav,
    pub username: String,
    pub error: String,
}

#[derive(Template)]
#[template(path = "users/logged_out.html")]
pub struct LoggedOutTemplate {
    pub nav: Nav,
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub nav: Nav,
}

#[derive(Template)]
#[template(path = "core/400.html")]
pub struct BadRequestTemplate {
    pub nav: Nav,
    pub message: String,
}

#[derive(Template)]
#[template(path = "core/500.html")]
pub struct ServerErrorTemplate {
    pub nav: Nav,
}

/// Which error page to show, plus an optional user-facing message.
#[derive(Debug)]
pub enum ErrorTemplate {
    NotFound,
    BadRequest(Option<String>),
    ServerError,
}

impl ErrorTemplate {
    pub fn not_found() -> Self {
        ErrorTemplate::NotFound
    }

    pub fn bad_request() -> Self {
        ErrorTemplate::BadRequest(None)
    }

    pub fn server_error() -> Self {
        ErrorTemplate::ServerError
    }

    pub fn with_message(self, message: Option<String>) -> Self {
        match self {
            ErrorTemplate::BadRequest(_) => ErrorTemplate::BadRequest(message),
            other => other,
        }
    }

    pub fn render_html(self) -> Result<Html<String>, askama::Error> {
        let nav = Nav::default();
        let body = match self {
            ErrorTemplate::NotFound => NotFoundTemplate { nav }.render()?,
            ErrorTemplate::BadRequest(message) => BadRequestTemplate {
                nav,
                message: message.unwrap_or_default(),
            }
            .render()?,
            ErrorTemplate::ServerError => ServerErrorTemplate { nav }.render()?,
        };
        Ok(Html(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nav_reflects_viewer() {
        let user = User::new("NoName".to_string(), String::new());

        assert!(Nav::new(Some(&user)).is_authenticated());
        assert!(!Nav::new(None).is_authenticated());
    }

    #[test]
    fn test_post_form_marks_selected_group() {
        let groups = vec![
            Group {
                id: 1,
                title: "Первая".to_string(),
                slug: "first".to_string(),
                description: String::new(),
            },
            Group {
                id: 2,
                title: "Вторая".to_string(),
                slug: "second".to_string(),
                description: String::new(),
            },
        ];
        let form = PostForm {
            text: "Текст".to_string(),
            group: "2".to_string(),
            image: None,
        };

        let html = render(&CreatePostTemplate {
            nav: Nav::default(),
            is_edit: false,
            action: "/create/".to_string(),
            form,
            groups,
            current_image: String::new(),
            error: String::new(),
        })
        .expect("render post form");

        assert!(html.0.contains("<option value=\"2\" selected>"));
        assert!(html.0.contains("<option value=\"1\">"));
    }

    #[test]
    fn test_not_found_page_renders() {
        let html = ErrorTemplate::not_found().render_html().expect("render 404");
        assert!(html.0.contains("Page not found"));
    }

    #[test]
    fn test_bad_request_page_shows_message() {
        let html = ErrorTemplate::bad_request()
            .with_message(Some("Slug is taken".to_string()))
            .render_html()
            .expect("render 400");
        assert!(html.0.contains("Slug is taken"));
    }
}
