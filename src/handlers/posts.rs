// Post handlers
// Feeds, post pages, the post form, comments and follows

use axum::{
    extract::{Form, Multipart, OriginalUri, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, info};

use crate::{
    app::AppState,
    auth::{CurrentUser, Viewer},
    cache::PageCache,
    error::{AppError, AppResult},
    models::{
        CommentForm, NewComment, NewPost, PostCard, PostChanges, PostForm, UploadedImage, User,
    },
    paginator::{Page, PageQuery},
    store::PostScope,
    templates::{
        render, CreatePostTemplate, FollowTemplate, GroupListTemplate, IndexTemplate, Nav,
        PostDetailTemplate, ProfileTemplate,
    },
};

fn parse_post_id(raw: &str) -> AppResult<i32> {
    raw.parse::<i32>()
        .map_err(|_| AppError::not_found(format!("Post {}", raw)))
}

fn detail_url(post_id: i32) -> String {
    format!("/posts/{}/", post_id)
}

/// Bytes escaped inside one URL path segment; non-ASCII is always escaped.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn profile_url(username: &str) -> String {
    format!("/profile/{}/", utf8_percent_encode(username, PATH_SEGMENT))
}

/// One page of a feed, resolved against `?page=`.
async fn paginate(state: &AppState, scope: PostScope, query: &PageQuery) -> AppResult<Page<PostCard>> {
    let total = state.store.count_posts(scope).await?;
    let window = state.paginator.window(query.page.as_deref(), total);
    let items = state
        .store
        .list_posts(scope, window.limit, window.offset)
        .await?;

    Ok(Page::new(items, window, total))
}

/// Home feed, all posts newest first
/// GET /
pub async fn index(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Viewer(viewer): Viewer,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<String>> {
    let uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let key = PageCache::key(&uri, viewer.as_ref());

    if let Some(html) = state.cache.get(&key).await {
        debug!("Serving {} from page cache", uri);
        return Ok(Html(html));
    }

    let page = paginate(&state, PostScope::All, &query).await?;
    let html = render(&IndexTemplate {
        nav: Nav::new(viewer.as_ref()),
        page,
    })?;

    state.cache.insert(key, html.0.clone()).await;
    Ok(html)
}

/// Posts of one group
/// GET /group/:slug/
pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Viewer(viewer): Viewer,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<String>> {
    let group = state
        .store
        .get_group_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Group {}", slug)))?;

    let page = paginate(&state, PostScope::Group(group.id), &query).await?;

    render(&GroupListTemplate {
        nav: Nav::new(viewer.as_ref()),
        group,
        page,
    })
}

/// An author's posts plus the follow toggle
/// GET /profile/:username/
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Viewer(viewer): Viewer,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<String>> {
    let author = find_author(&state, &username).await?;

    let posts_count = state.store.count_posts(PostScope::Author(author.id)).await?;
    let following = match viewer {
        Some(ref user) => state.store.is_following(user.id, author.id).await?,
        None => false,
    };
    let show_follow = viewer.as_ref().is_some_and(|user| user.id != author.id);
    let page = paginate(&state, PostScope::Author(author.id), &query).await?;

    render(&ProfileTemplate {
        nav: Nav::new(viewer.as_ref()),
        author,
        posts_count,
        following,
        show_follow,
        page,
    })
}

/// A single post with its comments
/// GET /posts/:post_id/
pub async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Viewer(viewer): Viewer,
) -> AppResult<Html<String>> {
    let post_id = parse_post_id(&post_id)?;
    let card = state
        .store
        .get_post(post_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Post {}", post_id)))?;

    let posts_count = state
        .store
        .count_posts(PostScope::Author(card.post.author_id))
        .await?;
    let comments = state.store.list_comments(post_id).await?;
    let can_edit = viewer.as_ref().is_some_and(|user| user.id == card.post.author_id);

    render(&PostDetailTemplate {
        nav: Nav::new(viewer.as_ref()),
        card,
        posts_count,
        comments,
        can_edit,
    })
}

/// Empty post form
/// GET /create/
pub async fn post_create_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    render_post_form(&state, &user, None, PostForm::default(), String::new(), String::new()).await
}

/// Publish a post
/// POST /create/
pub async fn post_create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = read_post_form(multipart).await?;
    let groups = state.store.list_groups().await?;

    if let Err(message) = form.validate(&groups) {
        debug!("Rejected post form from {}: {}", user.username, message);
        return render_post_form(&state, &user, None, form, String::new(), message).await;
    }

    let image = match form.image {
        Some(ref image) => Some(state.media.save_post_image(image).await?),
        None => None,
    };

    let post = state
        .store
        .create_post(NewPost {
            author_id: user.id,
            text: form.get_normalized_text(),
            group_id: form.get_group_id(),
            image,
        })
        .await?;

    info!("User {} published post {}", user.username, post.id);
    Ok(Redirect::to(&profile_url(&user.username)).into_response())
}

/// Pre-filled post form, author only
/// GET /posts/:post_id/edit/
pub async fn post_edit_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Response> {
    let post_id = parse_post_id(&post_id)?;
    let card = state
        .store
        .get_post(post_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Post {}", post_id)))?;

    if card.post.author_id != user.id {
        return Ok(Redirect::to(&detail_url(post_id)).into_response());
    }

    let current_image = card.image_path().to_string();
    let form = PostForm::from_post(&card.post);
    render_post_form(&state, &user, Some(post_id), form, current_image, String::new()).await
}

/// Save an edited post, author only
/// POST /posts/:post_id/edit/
pub async fn post_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let post_id = parse_post_id(&post_id)?;
    let card = state
        .store
        .get_post(post_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Post {}", post_id)))?;

    if card.post.author_id != user.id {
        debug!("User {} may not edit post {}", user.username, post_id);
        return Ok(Redirect::to(&detail_url(post_id)).into_response());
    }

    let form = read_post_form(multipart).await?;
    let groups = state.store.list_groups().await?;

    if let Err(message) = form.validate(&groups) {
        let current_image = card.image_path().to_string();
        return render_post_form(&state, &user, Some(post_id), form, current_image, message).await;
    }

    let image = match form.image {
        Some(ref image) => Some(state.media.save_post_image(image).await?),
        None => None,
    };

    state
        .store
        .update_post(
            post_id,
            PostChanges {
                text: form.get_normalized_text(),
                group_id: form.get_group_id(),
                image,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found(format!("Post {}", post_id)))?;

    info!("User {} edited post {}", user.username, post_id);
    Ok(Redirect::to(&detail_url(post_id)).into_response())
}

/// Comment on a post; always lands back on the post page
/// POST /posts/:post_id/add_comment/
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> AppResult<Redirect> {
    let post_id = parse_post_id(&post_id)?;
    if state.store.get_post(post_id).await?.is_none() {
        return Err(AppError::not_found(format!("Post {}", post_id)));
    }

    match form.validate() {
        Ok(()) => {
            let comment = state
                .store
                .create_comment(NewComment {
                    post_id,
                    author_id: user.id,
                    text: form.get_normalized_text(),
                })
                .await?;
            info!("User {} commented on post {} ({})", user.username, post_id, comment.id);
        }
        Err(message) => debug!("Ignored comment on post {}: {}", post_id, message),
    }

    Ok(Redirect::to(&detail_url(post_id)))
}

/// Posts of the authors the user follows
/// GET /follow/
pub async fn follow_index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<String>> {
    let page = paginate(&state, PostScope::FollowedBy(user.id), &query).await?;

    render(&FollowTemplate {
        nav: Nav::new(Some(&user)),
        page,
    })
}

/// Follow an author. Following yourself or following twice does nothing.
/// GET /profile/:username/follow/
pub async fn profile_follow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let author = find_author(&state, &username).await?;

    if author.id != user.id && !state.store.is_following(user.id, author.id).await? {
        state.store.follow(user.id, author.id).await?;
        info!("User {} now follows {}", user.username, author.username);
    }

    Ok(Redirect::to(&profile_url(&username)))
}

/// Stop following an author
/// GET /profile/:username/unfollow/
pub async fn profile_unfollow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    if state.store.unfollow(user.id, &username).await? {
        info!("User {} unfollowed {}", user.username, username);
    }

    Ok(Redirect::to(&profile_url(&username)))
}

async fn find_author(state: &AppState, username: &str) -> AppResult<User> {
    state
        .store
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {}", username)))
}

async fn render_post_form(
    state: &AppState,
    user: &User,
    post_id: Option<i32>,
    form: PostForm,
    current_image: String,
    error: String,
) -> AppResult<Response> {
    let groups = state.store.list_groups().await?;
    let action = match post_id {
        Some(id) => format!("/posts/{}/edit/", id),
        None => "/create/".to_string(),
    };

    let html = render(&CreatePostTemplate {
        nav: Nav::new(Some(user)),
        is_edit: post_id.is_some(),
        action,
        form,
        groups,
        current_image,
        error,
    })?;
    Ok(html.into_response())
}

/// Collect the `text`, `group` and `image` fields of the post form.
/// An empty file input means no new image.
async fn read_post_form(mut multipart: Multipart) -> AppResult<PostForm> {
    let mut form = PostForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid form data: {}", e.body_text())))?
    {
        match field.name() {
            Some("text") => {
                form.text = field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Invalid form data"))?;
            }
            Some("group") => {
                form.group = field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Invalid form data"))?;
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Upload failed: {}", e.body_text())))?;

                if !file_name.is_empty() || !bytes.is_empty() {
                    form.image = Some(UploadedImage {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}
