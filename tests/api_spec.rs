use axum::http::StatusCode;
use axum_test::TestServer;
use canopy::api::middleware::SecurityConfig;
use canopy::api::{create_router, create_router_with_config, AppState};
use canopy::db::Database;
use canopy::registry::FeatureRegistry;
use serde_json::{json, Value};

fn state() -> AppState {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    AppState::new(db, FeatureRegistry::with_builtin_features())
}

fn setup() -> TestServer {
    TestServer::new(create_router(state())).expect("Failed to create test server")
}

fn setup_with_key(key: &str) -> TestServer {
    let app = create_router_with_config(state(), SecurityConfig::with_api_key(key));
    TestServer::new(app).expect("Failed to create test server")
}

async fn seed_tree(server: &TestServer) {
    server
        .post("/directories")
        .json(&json!({ "title": "Weapons" }))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    server
        .post("/weapons/directories")
        .json(&json!({ "title": "Bows" }))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    server
        .post("/weapons/bows/directories")
        .json(&json!({ "title": "Arbalests" }))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();
        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

mod directories {
    use super::*;

    #[tokio::test]
    async fn create_redirects_to_the_dashboard() {
        let server = setup();

        let response = server
            .post("/directories")
            .json(&json!({ "title": "Weapons", "evil": "x" }))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons/dashboard");
        let body: Value = response.json();
        assert_eq!(body["flash"]["message"], json!("Directory successfully created."));
        assert_eq!(body["flash"]["lifetime"], json!("next"));
    }

    #[tokio::test]
    async fn invalid_create_renders_the_form_with_errors() {
        let server = setup();

        let response = server.post("/directories").json(&json!({ "title": "" })).await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["view"], json!("admin/directories/new"));
        assert_eq!(body["assigns"]["errors"]["title"], json!(["can't be blank"]));
        assert_eq!(body["flash"]["lifetime"], json!("now"));
    }

    #[tokio::test]
    async fn api_is_not_a_usable_slug() {
        let server = setup();

        let response = server.post("/directories").json(&json!({ "title": "API" })).await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["assigns"]["errors"]["slug"], json!(["is reserved"]));
        server.get("/api/v1/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn nested_paths_resolve_to_the_deepest_directory() {
        let server = setup();
        seed_tree(&server).await;

        let response = server.get("/weapons/bows/arbalests").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["view"], json!("directories/show"));
        assert_eq!(body["assigns"]["resource"]["slug"], json!("arbalests"));
        let chain: Vec<&str> = body["assigns"]["directories"]
            .as_array()
            .expect("directories")
            .iter()
            .filter_map(|d| d["slug"].as_str())
            .collect();
        assert_eq!(chain, vec!["weapons", "bows", "arbalests"]);
    }

    #[tokio::test]
    async fn missing_segments_redirect_to_the_deepest_match() {
        let server = setup();
        seed_tree(&server).await;

        let response = server.get("/weapons/bows/missing").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons/bows");
        let body: Value = response.json();
        assert_eq!(body["flash"]["level"], json!("warning"));

        let response = server.get("/weapons/swords/edit").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons/dashboard");
    }

    #[tokio::test]
    async fn empty_segments_are_malformed() {
        let server = setup();
        server.get("/weapons//bows").await.assert_status_bad_request();
    }

    #[tokio::test]
    async fn unsupported_actions_are_not_found() {
        let server = setup();
        seed_tree(&server).await;
        server.post("/weapons").await.assert_status_not_found();
        server.get("/weapons/publish").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn dashboard_lists_children() {
        let server = setup();
        seed_tree(&server).await;

        let response = server.get("/weapons/dashboard").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["view"], json!("admin/directories/dashboard"));
        assert_eq!(body["assigns"]["locals"]["children"][0]["slug"], json!("bows"));
    }

    #[tokio::test]
    async fn destroy_removes_the_subtree() {
        let server = setup();
        seed_tree(&server).await;

        let response = server.delete("/weapons/bows").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons/dashboard");

        let response = server.get("/weapons/bows/arbalests").await;
        assert_eq!(response.header("location"), "/weapons");
    }

    #[tokio::test]
    async fn update_follows_the_new_slug() {
        let server = setup();
        seed_tree(&server).await;

        let response = server
            .patch("/weapons/bows")
            .json(&json!({ "title": "Longbows" }))
            .await;

        assert_eq!(response.header("location"), "/weapons/longbows/dashboard");
        server.get("/weapons/longbows").await.assert_status_ok();
    }
}

mod features {
    use super::*;

    #[tokio::test]
    async fn pages_are_created_under_the_resolved_directory() {
        let server = setup();
        seed_tree(&server).await;

        let response = server
            .post("/weapons/bows/pages")
            .json(&json!({ "title": "Care Guide", "body": "Keep them dry." }))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons/bows/care-guide");

        let response = server.get("/weapons/bows/care-guide").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["view"], json!("features/pages/show"));
        assert_eq!(body["assigns"]["resource"]["body"], json!("Keep them dry."));
    }

    #[tokio::test]
    async fn posts_nest_inside_blogs() {
        let server = setup();
        seed_tree(&server).await;

        server
            .post("/weapons/blogs")
            .json(&json!({ "title": "News" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = server
            .post("/weapons/news/posts")
            .json(&json!({ "title": "Restock" }))
            .await;
        assert_eq!(response.header("location"), "/weapons/news/restock");

        let response = server.get("/weapons/news/posts").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["view"], json!("admin/features/blog_posts/index"));
        assert_eq!(body["assigns"]["resources"][0]["slug"], json!("restock"));
    }

    #[tokio::test]
    async fn posts_cannot_live_directly_in_a_directory() {
        let server = setup();
        seed_tree(&server).await;

        server
            .post("/weapons/posts")
            .json(&json!({ "title": "Stray" }))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn publish_and_unpublish() {
        let server = setup();
        server
            .post("/pages")
            .json(&json!({ "title": "About" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = server.post("/about/publish").await;
        assert_eq!(response.header("location"), "/about");
        let body: Value = response.json();
        assert_eq!(body["flash"]["message"], json!("Page successfully published."));

        let shown: Value = server.get("/about").await.json();
        assert!(shown["assigns"]["resource"]["published_at"].is_string());

        server.post("/about/unpublish").await.assert_status(StatusCode::SEE_OTHER);
        let shown: Value = server.get("/about").await.json();
        assert!(shown["assigns"]["resource"]["published_at"].is_null());
        assert!(shown["assigns"]["resource"]["published_order"].is_null());
    }

    #[tokio::test]
    async fn root_index_page_is_the_home_page() {
        let server = setup();
        server
            .post("/pages")
            .json(&json!({ "title": "Index", "body": "Welcome" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let body: Value = server.get("/").await.json();
        assert_eq!(body["view"], json!("features/pages/show"));
        assert_eq!(body["assigns"]["resource"]["body"], json!("Welcome"));
    }

    #[tokio::test]
    async fn lists_registered_scopes() {
        let server = setup();

        let response = server.get("/api/v1/features").await;

        response.assert_status_ok();
        let body: Value = response.json();
        let posts = body
            .as_array()
            .expect("array")
            .iter()
            .find(|f| f["scope"] == json!("posts"))
            .expect("posts scope");
        assert_eq!(posts["chain"], json!(["posts", "blogs"]));
        assert_eq!(posts["policy"]["display_name"], json!("Post"));
    }
}

mod export {
    use super::*;

    #[tokio::test]
    async fn exports_everything_from_the_root() {
        let server = setup();
        seed_tree(&server).await;

        let response = server.get("/api/v1/export").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["assigns"]["locals"]["record_count"], json!(3));
        assert_eq!(
            body["assigns"]["resource"]["directories"][0]["directory"]["slug"],
            json!("weapons")
        );
    }

    #[tokio::test]
    async fn exports_a_subtree() {
        let server = setup();
        seed_tree(&server).await;

        let body: Value = server.get("/api/v1/export/weapons/bows").await.json();

        assert_eq!(body["assigns"]["locals"]["record_count"], json!(2));
        assert_eq!(body["assigns"]["resource"]["directory"]["slug"], json!("bows"));
    }

    #[tokio::test]
    async fn exported_documents_import_elsewhere() {
        let server = setup();
        seed_tree(&server).await;
        server
            .post("/directories")
            .json(&json!({ "title": "Armoury" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let exported: Value = server.get("/api/v1/export/weapons/bows").await.json();
        let form = server.get("/armoury/directories/import").await;
        form.assert_status_ok();
        assert_eq!(form.json::<Value>()["view"], json!("admin/directories/import"));

        let response = server
            .post("/armoury/directories/import")
            .json(&exported["assigns"]["resource"])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/armoury/dashboard");
        server.get("/armoury/bows/arbalests").await.assert_status_ok();
    }
}

mod access {
    use super::*;

    #[tokio::test]
    async fn wrong_keys_are_rejected() {
        let server = setup_with_key("secret");
        server
            .get("/")
            .authorization_bearer("guess")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_visitors_are_redirected_away_from_admin_actions() {
        let server = setup_with_key("secret");
        server
            .post("/directories")
            .authorization_bearer("secret")
            .json(&json!({ "title": "Weapons" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = server.get("/weapons/dashboard").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/weapons");
        let body: Value = response.json();
        assert_eq!(body["flash"]["message"], json!("Unauthorized action"));

        server.get("/weapons").await.assert_status_ok();
    }

    #[tokio::test]
    async fn anonymous_visitors_only_see_published_pages() {
        let server = setup_with_key("secret");
        server
            .post("/pages")
            .authorization_bearer("secret")
            .json(&json!({ "title": "Draft" }))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = server.get("/draft").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/");

        server
            .post("/draft/publish")
            .authorization_bearer("secret")
            .await
            .assert_status(StatusCode::SEE_OTHER);
        server.get("/draft").await.assert_status_ok();
    }
}
