use axum::http::StatusCode;
use famscore_server::{server, storage};
use famscore_shared::api::endpoints;
use famscore_shared::domain::MemberRole;
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const FAMILY_ID: &str = "smith";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                LOGIN_PATH,
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let admin_pwd = "secret123";
    let member_pwd = "benpass";
    let admin_hash = bcrypt::hash(admin_pwd, bcrypt::DEFAULT_COST).unwrap();
    let member_hash = bcrypt::hash(member_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        jwt_secret: "testsecret".into(),
        family: server::FamilyConfig {
            id: FAMILY_ID.into(),
            name: "The Smiths".into(),
        },
        members: vec![
            server::MemberConfig {
                id: "anna".into(),
                name: "Anna".into(),
                role: MemberRole::Admin,
                avatar: None,
            },
            server::MemberConfig {
                id: "ben".into(),
                name: "Ben".into(),
                role: MemberRole::Regular,
                avatar: Some("fox".into()),
            },
            server::MemberConfig {
                id: "caro".into(),
                name: "Caro".into(),
                role: MemberRole::Regular,
                avatar: None,
            },
        ],
        users: vec![
            server::UserConfig {
                username: "anna".into(),
                password_hash: admin_hash,
                member_id: "anna".into(),
            },
            server::UserConfig {
                username: "ben".into(),
                password_hash: member_hash,
                member_id: "ben".into(),
            },
        ],
        timezone: "UTC".into(),
        dev_cors_origin: None,
        listen_port: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap(), chrono_tz::UTC)
        .await
        .expect("db");
    store
        .seed_from_config(
            &config.family.id,
            &config.family.name,
            config.member_seeds(),
        )
        .await
        .expect("seed");

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;
    let version = server
        .request_expect("GET", &endpoints::version(""), None, None, StatusCode::OK)
        .await;
    assert!(version.get("version").and_then(|v| v.as_str()).is_some());
    let token = server.login("anna", "secret123").await;
    assert!(!token.is_empty());
    server
        .request_expect(
            "POST",
            LOGIN_PATH,
            None,
            Some(json!({"username": "anna", "password": "wrong"})),
            StatusCode::UNAUTHORIZED,
        )
        .await;
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", endpoints::tasks("", FAMILY_ID), None),
        ("GET", endpoints::today("", FAMILY_ID), None),
        ("GET", endpoints::leaderboard("", FAMILY_ID), None),
        (
            "POST",
            endpoints::tasks("", FAMILY_ID),
            Some(json!({"title": "Dishes"})),
        ),
        (
            "POST",
            endpoints::task_take("", FAMILY_ID, "t1"),
            Some(json!({"assignee_id": "ben"})),
        ),
        ("POST", endpoints::task_complete("", FAMILY_ID, "t1"), None),
        (
            "PUT",
            endpoints::family_settings("", FAMILY_ID),
            Some(json!({"show_reset_button": true})),
        ),
    ];

    for (method, path, body) in cases.iter() {
        server
            .request_expect(method, path, None, body.clone(), StatusCode::UNAUTHORIZED)
            .await;
    }
}

#[tokio::test]
async fn access_control_denies_wrong_role_and_foreign_family() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let member_token = server.login("ben", "benpass").await;

    // Admin-gated routes reject regular members.
    server
        .request_expect(
            "POST",
            &endpoints::tasks("", FAMILY_ID),
            Some(member_token.as_str()),
            Some(json!({"title": "Dishes", "score_value": 10})),
            StatusCode::FORBIDDEN,
        )
        .await;
    server
        .request_expect(
            "PUT",
            &endpoints::family_settings("", FAMILY_ID),
            Some(member_token.as_str()),
            Some(json!({"show_reset_button": true})),
            StatusCode::FORBIDDEN,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::member_adjustments("", FAMILY_ID, "caro"),
            Some(member_token.as_str()),
            Some(json!({"source": "bonus", "points": 5})),
            StatusCode::FORBIDDEN,
        )
        .await;

    // Another family's scope is off limits even for admins.
    let admin_token = server.login("anna", "secret123").await;
    server
        .request_expect(
            "GET",
            &endpoints::tasks("", "joneses"),
            Some(admin_token.as_str()),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;
}

#[tokio::test]
async fn house_task_lifecycle_with_reset() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let admin_token = server.login("anna", "secret123").await;
    let member_token = server.login("ben", "benpass").await;

    let task = server
        .request_expect(
            "POST",
            &endpoints::tasks("", FAMILY_ID),
            Some(admin_token.as_str()),
            Some(json!({"title": "Vacuum the hall", "score_value": 10})),
            StatusCode::OK,
        )
        .await;
    let task_id = task.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    assert_eq!(task.get("status").unwrap(), "open");

    // Ben takes the task for himself; a second take loses the race.
    server
        .request_expect(
            "POST",
            &endpoints::task_take("", FAMILY_ID, &task_id),
            Some(member_token.as_str()),
            Some(json!({"assignee_id": "ben"})),
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_take("", FAMILY_ID, &task_id),
            Some(admin_token.as_str()),
            Some(json!({"assignee_id": "caro"})),
            StatusCode::NOT_FOUND,
        )
        .await;

    let completed = server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, &task_id),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(completed.get("points").unwrap().as_i64().unwrap(), 10);

    // Double submission must not double-award.
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, &task_id),
            Some(member_token.as_str()),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;

    let scores = server
        .request_expect(
            "GET",
            &endpoints::member_scores("", FAMILY_ID, "ben"),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    let entries = scores.get("entries").unwrap().as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.get("source").unwrap(), "house");
    assert_eq!(entry.get("points").unwrap().as_i64().unwrap(), 10);
    assert_eq!(entry.get("title").unwrap(), "Vacuum the hall");
    let entry_id = entry.get("id").and_then(|v| v.as_str()).unwrap().to_string();

    let streak = server
        .request_expect(
            "GET",
            &endpoints::member_streak("", FAMILY_ID, "ben"),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(streak.get("current_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("longest_streak").unwrap().as_i64().unwrap(), 1);

    // Reset with a mismatched source id is rejected.
    server
        .request_expect(
            "POST",
            &endpoints::score_reset("", FAMILY_ID, &entry_id),
            Some(admin_token.as_str()),
            Some(json!({"source": "house", "source_id": "some-other-task"})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    // Admin resets the completion: entry gone, task taken again,
    // streak values untouched.
    server
        .request_expect(
            "POST",
            &endpoints::score_reset("", FAMILY_ID, &entry_id),
            Some(admin_token.as_str()),
            Some(json!({"source": "house", "source_id": task_id})),
            StatusCode::NO_CONTENT,
        )
        .await;

    let scores = server
        .request_expect(
            "GET",
            &endpoints::member_scores("", FAMILY_ID, "ben"),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(scores.get("entries").unwrap().as_array().unwrap().is_empty());

    let tasks = server
        .request_expect(
            "GET",
            &endpoints::tasks("", FAMILY_ID),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    let task = tasks
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t.get("id").unwrap() == task_id.as_str())
        .unwrap();
    assert_eq!(task.get("status").unwrap(), "taken");
    assert_eq!(task.get("assignee_id").unwrap(), "ben");

    let streak = server
        .request_expect(
            "GET",
            &endpoints::member_streak("", FAMILY_ID, "ben"),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(streak.get("current_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("longest_streak").unwrap().as_i64().unwrap(), 1);
}

#[tokio::test]
async fn sport_school_and_adjustments_feed_the_leaderboard() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let admin_token = server.login("anna", "secret123").await;
    let member_token = server.login("ben", "benpass").await;

    // Ben logs an ad hoc activity for himself and completes it.
    let extra = server
        .request_expect(
            "POST",
            &endpoints::sport_activities("", FAMILY_ID),
            Some(member_token.as_str()),
            Some(json!({
                "member_id": "ben",
                "title": "Evening run",
                "kind": "extra",
                "score_value": 8
            })),
            StatusCode::OK,
        )
        .await;
    let extra_id = extra.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    let completed = server
        .request_expect(
            "POST",
            &endpoints::sport_activity_complete("", FAMILY_ID, &extra_id),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(completed.get("points").unwrap().as_i64().unwrap(), 8);
    server
        .request_expect(
            "POST",
            &endpoints::sport_activity_complete("", FAMILY_ID, &extra_id),
            Some(member_token.as_str()),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;

    // Admin-authored school task, completed by Ben.
    let school = server
        .request_expect(
            "POST",
            &endpoints::school_tasks("", FAMILY_ID),
            Some(admin_token.as_str()),
            Some(json!({
                "member_id": "ben",
                "title": "Math homework",
                "kind": "homework",
                "due_date": "2099-01-01",
                "score_value": 4
            })),
            StatusCode::OK,
        )
        .await;
    let school_id = school.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    server
        .request_expect(
            "POST",
            &endpoints::school_task_complete("", FAMILY_ID, &school_id),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;

    // Bonus and fine; non-positive points are rejected.
    server
        .request_expect(
            "POST",
            &endpoints::member_adjustments("", FAMILY_ID, "ben"),
            Some(admin_token.as_str()),
            Some(json!({"source": "bonus", "points": 5, "description": "Helped out"})),
            StatusCode::OK,
        )
        .await;
    let fine = server
        .request_expect(
            "POST",
            &endpoints::member_adjustments("", FAMILY_ID, "ben"),
            Some(admin_token.as_str()),
            Some(json!({"source": "fine", "points": 3, "description": "Muddy boots"})),
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::member_adjustments("", FAMILY_ID, "ben"),
            Some(admin_token.as_str()),
            Some(json!({"source": "bonus", "points": 0})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    // Fines cannot be undone through the reset pathway.
    let fine_id = fine.get("id").and_then(|v| v.as_str()).unwrap();
    server
        .request_expect(
            "POST",
            &endpoints::score_reset("", FAMILY_ID, fine_id),
            Some(admin_token.as_str()),
            Some(json!({"source": "fine", "source_id": null})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    // Lifetime total is derived from the ledger with the fine negated:
    // 8 (sport) + 4 (school) + 5 (bonus) - 3 (fine) = 14.
    let leaderboard = server
        .request_expect(
            "GET",
            &format!("{}?period=all", endpoints::leaderboard("", FAMILY_ID)),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    let rows = leaderboard.as_array().unwrap();
    assert_eq!(rows[0].get("member_id").unwrap(), "ben");
    assert_eq!(rows[0].get("total").unwrap().as_i64().unwrap(), 14);

    let recent = server
        .request_expect(
            "GET",
            &endpoints::recent_scores("", FAMILY_ID),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(recent.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn reset_button_flag_gates_member_resets() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let admin_token = server.login("anna", "secret123").await;
    let member_token = server.login("ben", "benpass").await;

    let extra = server
        .request_expect(
            "POST",
            &endpoints::sport_activities("", FAMILY_ID),
            Some(member_token.as_str()),
            Some(json!({"member_id": "ben", "title": "Bike ride", "kind": "extra", "score_value": 5})),
            StatusCode::OK,
        )
        .await;
    let extra_id = extra.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    server
        .request_expect(
            "POST",
            &endpoints::sport_activity_complete("", FAMILY_ID, &extra_id),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    let scores = server
        .request_expect(
            "GET",
            &endpoints::member_scores("", FAMILY_ID, "ben"),
            Some(member_token.as_str()),
            None,
            StatusCode::OK,
        )
        .await;
    let entry_id = scores.get("entries").unwrap().as_array().unwrap()[0]
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let reset_body = json!({"source": "sport", "source_id": extra_id});

    // Disabled by default for regular members.
    server
        .request_expect(
            "POST",
            &endpoints::score_reset("", FAMILY_ID, &entry_id),
            Some(member_token.as_str()),
            Some(reset_body.clone()),
            StatusCode::FORBIDDEN,
        )
        .await;

    let family = server
        .request_expect(
            "PUT",
            &endpoints::family_settings("", FAMILY_ID),
            Some(admin_token.as_str()),
            Some(json!({"show_reset_button": true})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(family.get("show_reset_button").unwrap(), true);

    server
        .request_expect(
            "POST",
            &endpoints::score_reset("", FAMILY_ID, &entry_id),
            Some(member_token.as_str()),
            Some(reset_body),
            StatusCode::NO_CONTENT,
        )
        .await;
}
