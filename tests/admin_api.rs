//! Administration surface against an in-process backend: payload shapes,
//! multipart uploads, path building and response decoding.

mod support;

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Json, Multipart, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use scrutin::admin::{self, CandidateForm, ElectionForm, PhotoUpload};
use scrutin::api::ApiClient;
use scrutin::error::ApiError;
use scrutin::models::{TokenPair, Uid};
use scrutin::results;
use scrutin::session::SessionManager;
use scrutin::session::store::{MemoryStore, SessionStore};

use support::{Calls, bearer, jwt, serve};

fn authed(base: String) -> SessionManager {
    let store = Arc::new(MemoryStore::new());
    store
        .save(&TokenPair {
            access_token: jwt("chair", 3600),
            refresh_token: "refresh".into(),
        })
        .unwrap();
    SessionManager::new(Arc::new(ApiClient::new(base)), store).unwrap()
}

fn form() -> ElectionForm {
    ElectionForm {
        title: "Bureau 2031".into(),
        start_at: Utc.with_ymd_and_hms(2031, 5, 1, 8, 0, 0).unwrap(),
        end_at: Utc.with_ymd_and_hms(2031, 5, 1, 20, 0, 0).unwrap(),
    }
}

type SeenParts = Arc<Mutex<Vec<(String, Option<String>, Option<String>, Vec<u8>)>>>;

fn multipart_sink(seen: SeenParts) -> axum::routing::MethodRouter {
    post(move |mut multipart: Multipart| {
        let seen = seen.clone();
        async move {
            let mut parts = Vec::new();
            while let Some(field) = multipart.next_field().await.unwrap() {
                let name = field.name().unwrap_or_default().to_string();
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.unwrap().to_vec();
                parts.push((name, file_name, content_type, bytes));
            }
            *seen.lock().unwrap() = parts;
            (StatusCode::CREATED, Json(json!({ "created": 3 })))
        }
    })
}

#[tokio::test]
async fn election_create_sends_the_backend_datetime_format() {
    let posts = Calls::new();

    let post_counter = posts.clone();
    let app = Router::new().route(
        "/api/v1/admin/elections",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let post_counter = post_counter.clone();
            async move {
                post_counter.hit();
                assert!(bearer(&headers).is_some());
                assert_eq!(
                    body,
                    json!({
                        "title": "Bureau 2031",
                        "start_at": "2031-05-01 08:00:00",
                        "end_at": "2031-05-01 20:00:00"
                    })
                );
                (StatusCode::CREATED, Json(json!({ "uid": 4 })))
            }
        })
        .get(|| async {
            Json(json!([{
                "id": 4,
                "title": "Bureau 2031",
                "start_at": "2031-05-01 08:00:00",
                "end_at": "2031-05-01 20:00:00"
            }]))
        }),
    );

    let session = authed(serve(app).await);
    admin::create_election(&session, &form()).await.unwrap();
    assert_eq!(posts.count(), 1);

    let elections = admin::list_elections(&session).await.unwrap();
    assert_eq!(elections.len(), 1);
    assert_eq!(elections[0].uid, Uid::Num(4));
    assert_eq!(elections[0].title, "Bureau 2031");
}

#[tokio::test]
async fn invalid_election_forms_never_reach_the_network() {
    let posts = Calls::new();

    let post_counter = posts.clone();
    let app = Router::new().route(
        "/api/v1/admin/elections",
        post(move || {
            let post_counter = post_counter.clone();
            async move {
                post_counter.hit();
                StatusCode::CREATED
            }
        }),
    );

    let session = authed(serve(app).await);

    let mut inverted = form();
    std::mem::swap(&mut inverted.start_at, &mut inverted.end_at);
    let err = admin::create_election(&session, &inverted).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let untitled = ElectionForm {
        title: "  ".into(),
        ..form()
    };
    let err = admin::create_election(&session, &untitled).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    assert_eq!(posts.count(), 0);
}

#[tokio::test]
async fn candidate_upload_is_a_multipart_form_with_optional_photo() {
    let seen: SeenParts = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route(
        "/api/v1/admin/elections/7/candidates",
        multipart_sink(seen.clone()),
    );

    let session = authed(serve(app).await);
    let photo_bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];
    let form = CandidateForm {
        name: "Doe".into(),
        prenom: "Jane".into(),
        photo: Some(PhotoUpload {
            file_name: "jane.png".into(),
            bytes: photo_bytes.clone(),
        }),
    };
    admin::add_candidate(&session, &Uid::Num(7), &form)
        .await
        .unwrap();

    let parts = seen.lock().unwrap().clone();
    assert_eq!(parts.len(), 3);

    let name = parts.iter().find(|p| p.0 == "name").unwrap();
    assert_eq!(name.3, b"Doe");
    let prenom = parts.iter().find(|p| p.0 == "prenom").unwrap();
    assert_eq!(prenom.3, b"Jane");
    let photo = parts.iter().find(|p| p.0 == "photo").unwrap();
    assert_eq!(photo.1.as_deref(), Some("jane.png"));
    assert_eq!(photo.2.as_deref(), Some("image/png"));
    assert_eq!(photo.3, photo_bytes);
}

#[tokio::test]
async fn roster_listing_and_deletion_by_identifier() {
    let deletes = Calls::new();

    let delete_counter = deletes.clone();
    let app = Router::new()
        .route(
            "/api/v1/admin/elections/7/votants",
            get(|| async {
                Json(json!([
                    { "email": "a@vote.example", "is_active": false, "mailed": true },
                    { "email": "b@vote.example" }
                ]))
            }),
        )
        .route(
            "/api/v1/admin/elections/7/votants/:identifier",
            delete(move |Path(identifier): Path<String>| {
                let delete_counter = delete_counter.clone();
                async move {
                    delete_counter.hit();
                    // Percent-encoding on the wire decodes back to the raw id.
                    assert_eq!(identifier, "jane+doe@vote.example");
                    StatusCode::NO_CONTENT
                }
            }),
        );

    let session = authed(serve(app).await);

    let voters = admin::list_votants(&session, &Uid::Num(7)).await.unwrap();
    assert_eq!(voters.len(), 2);
    assert!(!voters[0].is_active);
    assert!(voters[0].mailed);
    assert!(voters[1].is_active);
    assert!(!voters[1].mailed);

    admin::delete_votant(&session, &Uid::Num(7), "jane+doe@vote.example")
        .await
        .unwrap();
    assert_eq!(deletes.count(), 1);
}

#[tokio::test]
async fn csv_import_uploads_the_file_field() {
    let seen: SeenParts = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route(
        "/api/v1/admin/elections/7/tokens/create/csv",
        multipart_sink(seen.clone()),
    );

    let session = authed(serve(app).await);
    let report = admin::import_tokens_csv(
        &session,
        &Uid::Num(7),
        "roster.csv",
        admin::CSV_TEMPLATE.as_bytes().to_vec(),
    )
    .await
    .unwrap();
    assert_eq!(report.count(), 3);

    let parts = seen.lock().unwrap().clone();
    assert_eq!(parts.len(), 1);
    let (name, file_name, content_type, bytes) = &parts[0];
    assert_eq!(name, "file");
    assert_eq!(file_name.as_deref(), Some("roster.csv"));
    assert_eq!(content_type.as_deref(), Some("text/csv"));
    assert_eq!(bytes, admin::CSV_TEMPLATE.as_bytes());
}

#[tokio::test]
async fn single_token_creation_posts_the_identifier() {
    let posts = Calls::new();

    let post_counter = posts.clone();
    let app = Router::new().route(
        "/api/v1/admin/elections/7/tokens/create/email",
        post(move |Json(body): Json<Value>| {
            let post_counter = post_counter.clone();
            async move {
                post_counter.hit();
                assert_eq!(body, json!({ "email": "new@voter.example" }));
                StatusCode::CREATED
            }
        }),
    );

    let session = authed(serve(app).await);

    let err = admin::create_token_email(&session, &Uid::Num(7), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(posts.count(), 0);

    admin::create_token_email(&session, &Uid::Num(7), " new@voter.example ")
        .await
        .unwrap();
    assert_eq!(posts.count(), 1);
}

#[tokio::test]
async fn sending_tokens_targets_the_right_endpoint() {
    let pending = Calls::new();
    let everyone = Calls::new();

    let pending_counter = pending.clone();
    let everyone_counter = everyone.clone();
    let app = Router::new()
        .route(
            "/api/v1/admin/elections/7/tokens/send",
            post(move || {
                let pending_counter = pending_counter.clone();
                async move {
                    pending_counter.hit();
                    Json(json!({ "sent": 5 }))
                }
            }),
        )
        .route(
            "/api/v1/admin/elections/7/tokens/send/all",
            post(move || {
                let everyone_counter = everyone_counter.clone();
                async move {
                    everyone_counter.hit();
                    Json(json!({ "sent": 12 }))
                }
            }),
        );

    let session = authed(serve(app).await);

    let report = admin::send_tokens(&session, &Uid::Num(7)).await.unwrap();
    assert_eq!(report.count(), 5);
    let report = admin::send_tokens_all(&session, &Uid::Num(7)).await.unwrap();
    assert_eq!(report.count(), 12);
    assert_eq!(pending.count(), 1);
    assert_eq!(everyone.count(), 1);
}

#[tokio::test]
async fn results_decode_and_rank_with_ties() {
    let app = Router::new().route(
        "/api/v1/admin/elections/7/results",
        get(|| async {
            Json(json!({
                "election": {
                    "uid": 7,
                    "title": "Bureau 2031",
                    "start_at": "2031-05-01 08:00:00",
                    "end_at": "2031-05-01 20:00:00"
                },
                "results": [
                    { "candidate_uid": 1, "name": "Durand", "prenom": "Paul", "vote_count": 5 },
                    { "candidate_uid": 2, "name": "Martin", "prenom": "Zoé", "vote_count": 5 },
                    { "candidate_uid": 3, "name": "Petit", "prenom": "Luc", "vote_count": 3 }
                ]
            }))
        }),
    );

    let session = authed(serve(app).await);
    let data = admin::results(&session, &Uid::Num(7)).await.unwrap();
    assert_eq!(data.election.as_ref().unwrap().title, "Bureau 2031");

    let table = results::standings(&data.results);
    let ranks: Vec<usize> = table.iter().map(|s| s.rank).collect();
    assert_eq!(ranks, vec![1, 1, 3]);
    assert!(table[0].ex_aequo && table[1].ex_aequo);
    assert_eq!(table[0].percent, 38.5);
    assert_eq!(table[2].percent, 23.1);

    let leaders = results::leaders(&table);
    assert_eq!(leaders.len(), 2);
}

#[tokio::test]
async fn stats_decode_the_participation_overview() {
    let app = Router::new().route(
        "/api/v1/admin/stats",
        get(|| async {
            Json(json!([
                {
                    "election_uid": 7,
                    "total_voters": 120,
                    "total_tokens": 118,
                    "votes_cast": 64,
                    "total_candidates": 3,
                    "participation_rate": 54.2
                },
                { "election_uid": "be-2030" }
            ]))
        }),
    );

    let session = authed(serve(app).await);
    let rows = admin::stats(&session).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].votes_cast, 64);
    assert_eq!(rows[0].participation_rate, 54.2);
    assert_eq!(rows[1].election_uid, Uid::Text("be-2030".into()));
    assert_eq!(rows[1].total_voters, 0);
}

#[tokio::test]
async fn election_lifecycle_hits_the_expected_routes() {
    let patches = Calls::new();
    let deletes = Calls::new();
    let starts = Calls::new();
    let stops = Calls::new();

    let patch_counter = patches.clone();
    let delete_counter = deletes.clone();
    let start_counter = starts.clone();
    let stop_counter = stops.clone();
    let app = Router::new()
        .route(
            "/api/v1/admin/elections/be-2031",
            patch(move |Json(body): Json<Value>| {
                let patch_counter = patch_counter.clone();
                async move {
                    patch_counter.hit();
                    assert_eq!(body["title"], "Bureau 2031 v2");
                    StatusCode::OK
                }
            })
            .delete(move || {
                let delete_counter = delete_counter.clone();
                async move {
                    delete_counter.hit();
                    StatusCode::NO_CONTENT
                }
            }),
        )
        .route(
            "/api/v1/admin/elections/be-2031/start",
            post(move || {
                let start_counter = start_counter.clone();
                async move {
                    start_counter.hit();
                    StatusCode::OK
                }
            }),
        )
        .route(
            "/api/v1/admin/elections/be-2031/stop",
            post(move || {
                let stop_counter = stop_counter.clone();
                async move {
                    stop_counter.hit();
                    StatusCode::OK
                }
            }),
        );

    let session = authed(serve(app).await);
    let uid = Uid::Text("be-2031".into());

    let updated = ElectionForm {
        title: "Bureau 2031 v2".into(),
        ..form()
    };
    admin::update_election(&session, &uid, &updated).await.unwrap();
    admin::start_election(&session, &uid).await.unwrap();
    admin::stop_election(&session, &uid).await.unwrap();
    admin::delete_election(&session, &uid).await.unwrap();

    assert_eq!(patches.count(), 1);
    assert_eq!(deletes.count(), 1);
    assert_eq!(starts.count(), 1);
    assert_eq!(stops.count(), 1);
}
