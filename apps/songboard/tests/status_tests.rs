//! Integration tests for track statuses and post logs.

mod common;

use common::TestApp;
use serde_json::json;

async fn seeded_track(app: &TestApp) -> i64 {
    let artist_id = app.seed_artist("Nova").await;
    let album_id = app.seed_album(artist_id, "Debut").await;
    app.seed_track(album_id, "Intro").await
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_defaults_to_idea_without_row() {
    let app = TestApp::new().await;
    let artist_id = app.seed_artist("Nova").await;
    let album_id = app.seed_album(artist_id, "Debut").await;
    {
        let db = app.db().lock().await;
        db.execute(
            "INSERT INTO tracks (album_id, artist_id, name) VALUES (?1, ?2, 'Bare')",
            [album_id, artist_id],
        )
        .unwrap();
    }

    let response = app.server().get("/api/tracks/1/status").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "idea");
    assert_eq!(body["starred"], false);
    assert_eq!(body["ignored"], false);
    // Reading never creates the row
    assert_eq!(app.count("track_statuses").await, 0);
}

#[tokio::test]
async fn test_update_status_moves_between_any_stages() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;

    for stage in ["recorded", "idea", "posted", "ready"] {
        let response = app
            .server()
            .patch(&format!("/api/tracks/{}/status", track_id))
            .json(&json!({ "status": stage }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], stage);
    }

    assert_eq!(app.count("track_statuses").await, 1);
}

#[tokio::test]
async fn test_starring_and_ignoring_are_exclusive() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;
    let url = format!("/api/tracks/{}/status", track_id);

    let ignored: serde_json::Value = app
        .server()
        .patch(&url)
        .json(&json!({ "ignored": true }))
        .await
        .json();
    assert_eq!(ignored["ignored"], true);

    let starred: serde_json::Value = app
        .server()
        .patch(&url)
        .json(&json!({ "starred": true }))
        .await
        .json();
    assert_eq!(starred["starred"], true);
    assert_eq!(starred["ignored"], false);

    let ignored_again: serde_json::Value = app
        .server()
        .patch(&url)
        .json(&json!({ "ignored": true }))
        .await
        .json();
    assert_eq!(ignored_again["starred"], false);
    assert_eq!(ignored_again["ignored"], true);

    // Unstarring alone leaves ignored alone
    let cleared: serde_json::Value = app
        .server()
        .patch(&url)
        .json(&json!({ "starred": false }))
        .await
        .json();
    assert_eq!(cleared["ignored"], true);
}

#[tokio::test]
async fn test_status_update_rejects_bad_requests() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;
    let url = format!("/api/tracks/{}/status", track_id);

    app.server()
        .patch(&url)
        .json(&json!({ "starred": true, "ignored": true }))
        .await
        .assert_status_bad_request();
    app.server()
        .patch(&url)
        .json(&json!({}))
        .await
        .assert_status_bad_request();
    app.server()
        .patch("/api/tracks/999/status")
        .json(&json!({ "status": "ready" }))
        .await
        .assert_status_not_found();
}

// =============================================================================
// Post logs
// =============================================================================

#[tokio::test]
async fn test_post_forces_posted_status() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;
    let posts_url = format!("/api/tracks/{}/posts", track_id);

    let response = app
        .server()
        .post(&posts_url)
        .json(&json!({
            "platform": "tiktok",
            "url": "https://tiktok.example/v/1",
            "posted_at": "2024-03-01T12:30:00+02:00"
        }))
        .await;

    response.assert_status_ok();
    let post: serde_json::Value = response.json();
    assert_eq!(post["platform"], "tiktok");
    assert_eq!(post["posted_at"], "2024-03-01 10:30:00");

    let detail: serde_json::Value = app
        .server()
        .get(&format!("/api/tracks/{}", track_id))
        .await
        .json();
    assert_eq!(detail["status"]["status"], "posted");
    assert_eq!(detail["posts"].as_array().unwrap().len(), 1);

    // Moving the track back and posting again lands on posted once more
    app.server()
        .patch(&format!("/api/tracks/{}/status", track_id))
        .json(&json!({ "status": "recorded" }))
        .await
        .assert_status_ok();
    app.server()
        .post(&posts_url)
        .json(&json!({ "platform": "youtube" }))
        .await
        .assert_status_ok();

    let status: serde_json::Value = app
        .server()
        .get(&format!("/api/tracks/{}/status", track_id))
        .await
        .json();
    assert_eq!(status["status"], "posted");

    let posts: serde_json::Value = app.server().get(&posts_url).await.json();
    assert_eq!(posts.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_post_creates_missing_status_row() {
    let app = TestApp::new().await;
    let artist_id = app.seed_artist("Nova").await;
    {
        let db = app.db().lock().await;
        db.execute(
            "INSERT INTO tracks (artist_id, name) VALUES (?1, 'Loose')",
            [artist_id],
        )
        .unwrap();
    }

    app.server()
        .post("/api/tracks/1/posts")
        .json(&json!({ "platform": "instagram" }))
        .await
        .assert_status_ok();

    assert_eq!(app.count("track_statuses").await, 1);
    assert_eq!(app.count("post_logs").await, 1);
}

#[tokio::test]
async fn test_post_validation() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;
    let posts_url = format!("/api/tracks/{}/posts", track_id);

    app.server()
        .post(&posts_url)
        .json(&json!({ "platform": " " }))
        .await
        .assert_status_bad_request();
    app.server()
        .post(&posts_url)
        .json(&json!({ "platform": "tiktok", "posted_at": "yesterday" }))
        .await
        .assert_status_bad_request();
    app.server()
        .post("/api/tracks/999/posts")
        .json(&json!({ "platform": "tiktok" }))
        .await
        .assert_status_not_found();

    assert_eq!(app.count("post_logs").await, 0);
}

#[tokio::test]
async fn test_deleting_post_keeps_status() {
    let app = TestApp::new().await;
    let track_id = seeded_track(&app).await;

    let post: serde_json::Value = app
        .server()
        .post(&format!("/api/tracks/{}/posts", track_id))
        .json(&json!({ "platform": "tiktok" }))
        .await
        .json();

    app.server()
        .delete(&format!("/api/posts/{}", post["id"]))
        .await
        .assert_status_ok();
    app.server()
        .delete(&format!("/api/posts/{}", post["id"]))
        .await
        .assert_status_not_found();

    let status: serde_json::Value = app
        .server()
        .get(&format!("/api/tracks/{}/status", track_id))
        .await
        .json();
    assert_eq!(status["status"], "posted");
    assert_eq!(app.count("post_logs").await, 0);
}

// =============================================================================
// Track list filters
// =============================================================================

#[tokio::test]
async fn test_track_list_filters_by_status_flags_and_artist() {
    let app = TestApp::new().await;
    let nova = app.seed_artist("Nova").await;
    let other = app.seed_artist("Other").await;
    let debut = app.seed_album(nova, "Debut").await;
    let elsewhere = app.seed_album(other, "Elsewhere").await;

    let ready = app.seed_track(debut, "Ready one").await;
    let starred = app.seed_track(debut, "Starred one").await;
    app.seed_track(debut, "Plain").await;
    app.seed_track(elsewhere, "Foreign").await;

    app.server()
        .patch(&format!("/api/tracks/{}/status", ready))
        .json(&json!({ "status": "ready" }))
        .await
        .assert_status_ok();
    app.server()
        .patch(&format!("/api/tracks/{}/status", starred))
        .json(&json!({ "starred": true }))
        .await
        .assert_status_ok();

    let by_status: serde_json::Value = app.server().get("/api/tracks?status=ready").await.json();
    assert_eq!(by_status["total"], 1);
    assert_eq!(by_status["items"][0]["id"], ready);
    assert_eq!(by_status["items"][0]["status"], "ready");

    let ideas: serde_json::Value = app.server().get("/api/tracks?status=idea").await.json();
    assert_eq!(ideas["total"], 3);

    let by_star: serde_json::Value = app.server().get("/api/tracks?starred=true").await.json();
    assert_eq!(by_star["total"], 1);
    assert_eq!(by_star["items"][0]["id"], starred);

    let by_artist: serde_json::Value = app
        .server()
        .get(&format!("/api/tracks?artist_id={}", nova))
        .await
        .json();
    assert_eq!(by_artist["total"], 3);

    let by_album: serde_json::Value = app
        .server()
        .get(&format!("/api/tracks?album_id={}", elsewhere))
        .await
        .json();
    assert_eq!(by_album["total"], 1);
    assert_eq!(by_album["items"][0]["name"], "Foreign");
}
