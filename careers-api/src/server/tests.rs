use crate::server::{ServerState, app, media::MediaStore};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use careers_db::client::DbClient;
use http_body_util::BodyExt;
use image::{ImageBuffer, ImageFormat, Rgb};
use serde_json::{Value, json};
use std::{io::Cursor, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

fn encoded(format: ImageFormat) -> Vec<u8> {
    let pixels = ImageBuffer::from_pixel(8, 8, Rgb([30_u8, 144, 255]));
    let mut bytes = Vec::new();
    pixels.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

struct TestApp {
    router: Router,
    db: Arc<DbClient>,
    media_root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let media_root = tempfile::tempdir().unwrap();
        let db = Arc::new(DbClient::in_memory().await.unwrap());
        let state = ServerState {
            db_client: Arc::clone(&db),
            media: Arc::new(MediaStore::new(media_root.path().to_owned())),
        };

        Self {
            router: app(state, 1024 * 1024),
            db,
            media_root,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn send_json(&self, method: Method, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send_empty(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn create_post(&self, username: &str) -> u64 {
        let (status, body) = self
            .send_json(
                Method::POST,
                "/careers/",
                &json!({
                    "username": username,
                    "title": "My first post",
                    "content": "Hello!",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_u64().unwrap()
    }
}

fn multipart_request(method: Method, uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let boundary = "careers-test-boundary";
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn create_post() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send_json(
            Method::POST,
            "/careers/",
            &json!({
                "username": "john_doe",
                "title": "My first post",
                "content": "Hello, this is my first post!",
                "likes": 99,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "john_doe");
    assert_eq!(body["title"], "My first post");
    assert_eq!(body["content"], "Hello, this is my first post!");
    assert_eq!(body["likes"], 0);
    assert_eq!(body["image"], Value::Null);
    assert_eq!(body["comments"], json!([]));
    assert!(body["id"].is_u64());
    assert!(body["created_datetime"].is_string());
}

#[tokio::test]
async fn create_post_reports_field_errors() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send_json(
            Method::POST,
            "/careers/",
            &json!({"username": "", "title": "t".repeat(256)}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "username": ["This field may not be blank."],
            "title": ["Ensure this field has no more than 255 characters."],
            "content": ["This field is required."],
        })
    );
    assert!(app.db.fetch_posts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_post_without_body() {
    let app = TestApp::new().await;

    let (status, body) = app.send_empty(Method::POST, "/careers/").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["title"], json!(["This field is required."]));
}

#[tokio::test]
async fn content_type_parameters_are_ignored() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/careers/")
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(
            json!({"username": "john_doe", "title": "Title", "content": "Content"}).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "john_doe");
}

#[tokio::test]
async fn create_post_from_url_encoded_form() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/careers/")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=jane_doe&title=Hi+there&content=Hello%21"))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Hi there");
    assert_eq!(body["content"], "Hello!");
}

#[tokio::test]
async fn create_post_with_image_upload() {
    let app = TestApp::new().await;
    let png = encoded(ImageFormat::Png);

    let request = multipart_request(
        Method::POST,
        "/careers/",
        &[
            ("username", None, b"john_doe"),
            ("title", None, b"With a picture"),
            ("content", None, b"Look at this"),
            ("image", Some("cat.png"), &png[..]),
        ],
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::CREATED);
    let image_url = body["image"].as_str().unwrap().to_owned();
    assert_eq!(image_url, "/media/post_images/cat.png");

    let response = app
        .router
        .clone()
        .oneshot(Request::get(&image_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.to_vec(), png);
}

#[tokio::test]
async fn rejects_corrupted_image() {
    let app = TestApp::new().await;
    let mut broken = encoded(ImageFormat::Png);
    broken.truncate(8);
    broken.extend_from_slice(b"this is definitely not image data");

    let request = multipart_request(
        Method::POST,
        "/careers/",
        &[
            ("username", None, b"john_doe"),
            ("title", None, b"Title"),
            ("content", None, b"Content"),
            ("image", Some("broken.png"), &broken[..]),
        ],
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"image": ["Upload a valid image. The file you uploaded was either not an image or a corrupted image."]})
    );
    assert!(!app.media_root.path().join("post_images").exists());
    assert!(app.db.fetch_posts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn stored_image_is_removed_when_saving_fails() {
    let app = TestApp::new().await;
    app.db.close().await;

    let request = multipart_request(
        Method::POST,
        "/careers/",
        &[
            ("username", None, b"john_doe"),
            ("title", None, b"Title"),
            ("content", None, b"Content"),
            ("image", Some("cat.png"), &encoded(ImageFormat::Png)[..]),
        ],
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"status": 500}));
    let leftovers = std::fs::read_dir(app.media_root.path().join("post_images"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn rejects_non_image_upload() {
    let app = TestApp::new().await;

    let request = multipart_request(
        Method::POST,
        "/careers/",
        &[
            ("username", None, b"john_doe"),
            ("title", None, b"Title"),
            ("content", None, b"Content"),
            ("image", Some("notes.txt"), b"just some text"),
        ],
    );
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"image": ["Upload a valid image. The file you uploaded was either not an image or a corrupted image."]})
    );
}

#[tokio::test]
async fn image_in_json_is_not_a_file() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send_json(
            Method::POST,
            "/careers/",
            &json!({
                "username": "john_doe",
                "title": "Title",
                "content": "Content",
                "image": "http://example.com/cat.png",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["image"],
        json!(["The submitted data was not a file. Check the encoding type on the form."])
    );
}

#[tokio::test]
async fn list_posts() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;

    let (status, body) = app.send_empty(Method::GET, "/careers/").await;

    assert_eq!(status, StatusCode::OK);
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], id);
}

#[tokio::test]
async fn list_posts_newest_first() {
    let app = TestApp::new().await;
    let first = app.create_post("john_doe").await;
    let second = app.create_post("john_doe").await;

    let (_, body) = app.send_empty(Method::GET, "/careers/").await;

    let ids: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, [second, first]);
}

#[tokio::test]
async fn list_posts_filtered_by_username() {
    let app = TestApp::new().await;
    app.create_post("john_doe").await;
    let jane = app.create_post("jane_doe").await;

    let (status, body) = app
        .send_empty(Method::GET, "/careers/?username=jane_doe")
        .await;
    assert_eq!(status, StatusCode::OK);
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["username"], "jane_doe");
    assert_eq!(posts[0]["id"], jane);

    let (_, body) = app
        .send_empty(Method::GET, "/careers/?username=JANE_DOE")
        .await;
    assert_eq!(body, json!([]));

    let (_, body) = app.send_empty(Method::GET, "/careers/?username=").await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn partial_update_post() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;
    app.send_empty(Method::POST, &format!("/careers/{id}/like/"))
        .await;

    let (status, body) = app
        .send_json(
            Method::PATCH,
            &format!("/careers/{id}/"),
            &json!({"title": "Updated title", "likes": 50, "id": 1}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["title"], "Updated title");
    assert_eq!(body["username"], "john_doe");
    assert_eq!(body["content"], "Hello!");
    assert_eq!(body["likes"], 1);
}

#[tokio::test]
async fn partial_update_validates_and_finds() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;

    let (status, body) = app
        .send_json(Method::PATCH, &format!("/careers/{id}/"), &json!({"content": null}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"content": ["This field may not be null."]}));

    let (status, body) = app
        .send_json(Method::PATCH, "/careers/12345/", &json!({"title": "x"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"status": 404, "detail": "Not found."}));
}

#[tokio::test]
async fn partial_update_sets_and_clears_image() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;

    let request = multipart_request(
        Method::PATCH,
        &format!("/careers/{id}/"),
        &[("image", Some("photo.jpg"), &encoded(ImageFormat::Jpeg)[..])],
    );
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image"], "/media/post_images/photo.jpg");
    assert_eq!(body["title"], "My first post");

    let (status, body) = app
        .send_json(Method::PATCH, &format!("/careers/{id}/"), &json!({"image": null}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image"], Value::Null);
}

#[tokio::test]
async fn delete_post() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;
    app.send_json(
        Method::POST,
        &format!("/careers/{id}/comments/"),
        &json!({"username": "me123", "content": "This is a comment"}),
    )
    .await;

    let (status, body) = app.send_empty(Method::DELETE, &format!("/careers/{id}/")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    assert_eq!(app.db.fetch_post(id.into()).await.unwrap(), None);
    assert!(app.db.fetch_comments(id.into()).await.unwrap().is_empty());

    let (status, _) = app.send_empty(Method::DELETE, &format!("/careers/{id}/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_unlike_post() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;
    let like = format!("/careers/{id}/like/");
    let unlike = format!("/careers/{id}/unlike/");

    let (status, body) = app.send_empty(Method::POST, &like).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "liked", "likes": 1}));

    let (status, body) = app.send_empty(Method::POST, &unlike).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unliked", "likes": 0}));

    let (status, body) = app.send_empty(Method::POST, &unlike).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unliked", "likes": 0}));

    let (status, _) = app.send_empty(Method::POST, "/careers/12345/like/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_are_all_counted() {
    let app = Arc::new(TestApp::new().await);
    let id = app.create_post("john_doe").await;

    let requests: Vec<_> = (0..25)
        .map(|_| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                let (status, _) = app
                    .send_empty(Method::POST, &format!("/careers/{id}/like/"))
                    .await;
                assert_eq!(status, StatusCode::OK);
            })
        })
        .collect();
    for request in requests {
        request.await.unwrap();
    }

    let post = app.db.fetch_post(id.into()).await.unwrap().unwrap();
    assert_eq!(post.likes, 25);
}

#[tokio::test]
async fn create_comment() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;

    let (status, body) = app
        .send_json(
            Method::POST,
            &format!("/careers/{id}/comments/"),
            &json!({"username": "me123", "content": "This is a comment", "post": 1}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "This is a comment");
    assert_eq!(body["username"], "me123");
    assert_eq!(body["post"], id);

    let (_, body) = app.send_empty(Method::GET, "/careers/").await;
    assert_eq!(body[0]["comments"][0]["content"], "This is a comment");
    assert_eq!(body[0]["comments"][0]["post"], id);
}

#[tokio::test]
async fn create_comment_errors() {
    let app = TestApp::new().await;
    let id = app.create_post("john_doe").await;

    let (status, body) = app
        .send_json(
            Method::POST,
            &format!("/careers/{id}/comments/"),
            &json!({"username": "me123"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"content": ["This field is required."]}));

    let (status, _) = app
        .send_json(
            Method::POST,
            "/careers/12345/comments/",
            &json!({"username": "me123", "content": "Hello"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The body is validated before the post is looked up.
    let (status, body) = app
        .send_json(Method::POST, "/careers/12345/comments/", &json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "username": ["This field is required."],
            "content": ["This field is required."],
        })
    );
}

#[tokio::test]
async fn malformed_requests() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/careers/")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\": "))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("JSON parse error"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/careers/")
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = app.send_empty(Method::DELETE, "/careers/abc/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send_empty(Method::GET, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send_empty(Method::PUT, "/careers/").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
