use std::io::Write;
use std::sync::Arc;

use actix_web::cookie::{Cookie, Key};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use dropout_classifier::api::{self, AppState, SESSION_COOKIE};
use dropout_classifier::database::Database;
use dropout_classifier::model::Classifier;
use dropout_classifier::Result;
use ndarray::{Array1, Array2};
use serde_json::{json, Value};

struct IpkThreshold;

impl Classifier for IpkThreshold {
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<bool>> {
        Ok(features.column(1).mapv(|ipk| ipk < 2.0))
    }
}

const UPLOAD: &str = "Nama;Prodi;NIM;Jenjang;IP;IPK;Jumlah Cuti;Jumlah Semester;Jumlah Kehadiran;Status\n\
Budi;TI;123;S1;3,2;3,1;0;4;90;Tidak DO\n\
Ani;SI;124;S1;1,2;1,5;2;8;40;DO\n\
Citra;TI;125;D3;1,9;1,8;1;6;55;Tidak DO\n";

async fn state(dataset: Option<std::path::PathBuf>) -> web::Data<AppState> {
    web::Data::new(AppState {
        db: Database::in_memory().await.unwrap(),
        classifier: Arc::new(IpkThreshold),
        dataset,
    })
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(api::session_middleware(Key::generate()))
                .app_data($state.clone())
                .configure(api::configure),
        )
        .await
    };
}

macro_rules! logged_in {
    ($app:expr) => {{
        let res = test::call_service(
            &$app,
            test::TestRequest::post()
                .uri("/api/register")
                .set_json(json!({
                    "username": "operator1",
                    "email": "op1@kampus.ac.id",
                    "password": "rahasia",
                    "role": "operator"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = test::call_service(
            &$app,
            test::TestRequest::post()
                .uri("/api/login")
                .set_json(json!({"username": "operator1", "password": "rahasia"}))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        res.response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie set")
            .into_owned()
    }};
}

fn upload_request(cookie: Cookie<'static>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/classify")
        .insert_header(("content-type", "text/csv"))
        .cookie(cookie)
        .set_payload(UPLOAD)
}

#[actix_web::test]
async fn protected_routes_require_login() {
    let state = state(None).await;
    let app = app!(state);

    for uri in ["/api/students", "/api/report", "/api/students/status", "/api/dashboard"] {
        let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/classify")
            .set_payload(UPLOAD)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = test::call_service(&app, test::TestRequest::delete().uri("/api/students").to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_with_bad_password_is_rejected() {
    let state = state(None).await;
    let app = app!(state);
    let _ = logged_in!(app);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({"username": "operator1", "password": "salah"}))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["message"], "Incorrect username or password");
}

#[actix_web::test]
async fn duplicate_registration_is_conflict() {
    let state = state(None).await;
    let app = app!(state);
    let _ = logged_in!(app);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/register")
            .set_json(json!({
                "username": "operator2",
                "email": "op1@kampus.ac.id",
                "password": "rahasia"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "conflict");
}

#[actix_web::test]
async fn session_reports_login_state() {
    let state = state(None).await;
    let app = app!(state);

    let anon: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/session").to_request(),
    )
    .await;
    assert_eq!(anon["logged_in"], false);

    let cookie = logged_in!(app);
    let me: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/session")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(me["logged_in"], true);
    assert_eq!(me["username"], "operator1");
}

#[actix_web::test]
async fn upload_then_report_and_search() {
    let state = state(None).await;
    let app = app!(state);
    let cookie = logged_in!(app);

    let res = test::call_service(&app, upload_request(cookie.clone()).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["persisted"]["inserted"], 3);
    assert_eq!(body["rows"][0]["predicted_status"], "Tidak DO");
    assert_eq!(body["rows"][1]["predicted_status"], "DO");
    assert_eq!(body["evaluation"]["confusion_matrix"]["matrix"], json!([[1, 1], [0, 1]]));

    let again: Value = test::call_and_read_body_json(&app, upload_request(cookie.clone()).to_request()).await;
    assert_eq!(again["persisted"]["inserted"], 0);
    assert_eq!(again["persisted"]["warnings"].as_array().unwrap().len(), 3);

    let search: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/students?q=Bud")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(search["rows"].as_array().unwrap().len(), 1);
    assert_eq!(search["rows"][0]["nim"], "123");

    let by_status: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/students/status?status=DO")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(by_status[0]["status"], "DO");
    assert_eq!(by_status[0]["rows"].as_array().unwrap().len(), 2);

    let all_statuses: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/students/status")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(all_statuses.as_array().unwrap().len(), 2);

    let report: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/report")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(report["table"][0]["Prodi"], "SI");
    assert_eq!(report["table"][1]["DO"], 1);
    assert_eq!(report["summary"]["max_do"]["Prodi"], "SI");

    let res = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/api/students")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(state.db.count_rows().await.unwrap(), (0, 0));

    let empty: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/report")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert!(empty["message"].is_string());
}

#[actix_web::test]
async fn malformed_upload_is_bad_request() {
    let state = state(None).await;
    let app = app!(state);
    let cookie = logged_in!(app);

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/classify")
            .cookie(cookie)
            .set_payload("Nama;Prodi;NIM\nBudi;TI;123\n")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "invalid_request");
}

#[actix_web::test]
async fn dashboard_reads_configured_dataset() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(UPLOAD.as_bytes()).unwrap();

    let state = state(Some(file.path().to_path_buf())).await;
    let app = app!(state);
    let cookie = logged_in!(app);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/dashboard")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 3);
    assert_eq!(body["status_distribution"][0]["status"], "Tidak DO");
    assert_eq!(body["status_distribution"][0]["count"], 2);
    assert_eq!(
        body["status_by_program"],
        json!([
            {"prodi": "SI", "status": "DO", "count": 1},
            {"prodi": "TI", "status": "Tidak DO", "count": 2}
        ])
    );
    // The dashboard does not persist anything.
    assert_eq!(state.db.count_rows().await.unwrap(), (0, 0));
}

#[actix_web::test]
async fn homepage_renders_stored_values_as_text() {
    let state = state(None).await;
    let app = app!(state);

    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();

    assert!(page.contains("function esc(value)"));
    assert!(page.contains("<td>${esc(r[c])}</td>"));
    assert!(page.contains("${esc(d.summary.max_message)}"));
    assert!(!page.contains("<td>${r[c]}</td>"));
    assert!(!page.contains("innerHTML = d.message;"));
}

#[actix_web::test]
async fn markup_in_uploaded_names_is_stored_verbatim() {
    let state = state(None).await;
    let app = app!(state);
    let cookie = logged_in!(app);

    let payload = "Nama;Prodi;NIM;Jenjang;IP;IPK;Jumlah Cuti;Jumlah Semester;Jumlah Kehadiran;Status\n\
                   <img src=x onerror=alert(1)>;TI;999;S1;3,0;3,0;0;4;90;Tidak DO\n";
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/classify")
            .cookie(cookie.clone())
            .set_payload(payload)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let search: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/students?q=999")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    // JSON carries the raw text; the page escapes it when rendering.
    assert_eq!(search["rows"][0]["nama"], "<img src=x onerror=alert(1)>");
}
