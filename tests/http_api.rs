use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::time::Duration;

use linkup_chat::server::config::ServerConfig;
use linkup_chat::server::database::Database;
use linkup_chat::server::state::AppState;
use linkup_chat::server::websocket::ChannelHub;
use linkup_chat::server::{auth, connections, routes, users};

async fn state() -> AppState {
    let db = Database::in_memory().await.unwrap();
    AppState::new(db, ChannelHub::new(), ServerConfig::default())
}

async fn user_with_token(state: &AppState, name: &str) -> (i64, String) {
    let id = users::create_user(&state.db, name).await.unwrap();
    let token = auth::register_session(&state.db, id, Duration::from_secs(3600)).await.unwrap();
    (id, token)
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

#[actix_web::test]
async fn requests_without_credential_are_unauthorized() {
    let state = state().await;
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/connections").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/me").insert_header(bearer("not-a-session")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn whoami_resolves_the_bearer() {
    let state = state().await;
    let (alice, token) = user_with_token(&state, "alice").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    let req = test::TestRequest::get().uri("/me").insert_header(bearer(&token)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["userId"], json!(alice));
    assert_eq!(body["username"], json!("alice"));
}

#[actix_web::test]
async fn request_accept_then_chat() {
    let state = state().await;
    let (alice, alice_token) = user_with_token(&state, "alice").await;
    let (bob, bob_token) = user_with_token(&state, "bob").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    // prima della connessione non si può scrivere
    let req = test::TestRequest::post()
        .uri("/messages/send")
        .insert_header(bearer(&alice_token))
        .set_json(json!({ "receiverId": bob, "content": "ciao" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/connections/request/{}", bob))
        .insert_header(bearer(&alice_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let connection_id = created["connectionId"].as_i64().unwrap();

    let req = test::TestRequest::get().uri("/connections/requests").insert_header(bearer(&bob_token)).to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["requesterId"], json!(alice));

    // solo il destinatario può accettare
    let req = test::TestRequest::post()
        .uri(&format!("/connections/accept/{}", connection_id))
        .insert_header(bearer(&alice_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/connections/accept/{}", connection_id))
        .insert_header(bearer(&bob_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/messages/send")
        .insert_header(bearer(&alice_token))
        .set_json(json!({ "receiverId": bob, "content": "ciao bob" }))
        .to_request();
    let sent: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sent["data"]["senderId"], json!(alice));
    assert_eq!(sent["data"]["content"], json!("ciao bob"));
    assert_eq!(sent["data"]["timestamp"].as_array().unwrap().len(), 7);

    let req = test::TestRequest::get().uri("/connections").insert_header(bearer(&bob_token)).to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list[0]["userId"], json!(alice));
    assert_eq!(list[0]["unreadCount"], json!(1));
    assert!(!list[0]["lastMessageSentAt"].is_null());

    let req = test::TestRequest::post()
        .uri(&format!("/messages/read/{}", alice))
        .insert_header(bearer(&bob_token))
        .to_request();
    let read: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(read["updated"], json!(1));

    let req = test::TestRequest::get().uri("/connections").insert_header(bearer(&bob_token)).to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list[0]["unreadCount"], json!(0));
}

#[actix_web::test]
async fn history_pages_carry_the_start_flag() {
    let state = state().await;
    let (alice, alice_token) = user_with_token(&state, "alice").await;
    let (bob, _) = user_with_token(&state, "bob").await;
    let id = connections::send_request(&state.db, alice, bob).await.unwrap();
    connections::accept(&state.db, bob, id).await.unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri("/messages/send")
            .insert_header(bearer(&alice_token))
            .set_json(json!({ "receiverId": bob, "content": format!("m{}", i) }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/messages/{}?page=0&size=2", bob))
        .insert_header(bearer(&alice_token))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    let contents: Vec<&str> = page["messages"].as_array().unwrap().iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["m1", "m2"]);
    assert_eq!(page["startOfChatReached"], json!(false));

    let req = test::TestRequest::get()
        .uri(&format!("/messages/{}?page=1&size=2", bob))
        .insert_header(bearer(&alice_token))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["messages"].as_array().unwrap().len(), 1);
    assert_eq!(page["startOfChatReached"], json!(true));
}

#[actix_web::test]
async fn history_with_a_stranger_is_forbidden() {
    let state = state().await;
    let (_, alice_token) = user_with_token(&state, "alice").await;
    let (carol, _) = user_with_token(&state, "carol").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/messages/{}", carol))
        .insert_header(bearer(&alice_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn typing_is_accepted_even_when_throttled() {
    let state = state().await;
    let (alice, alice_token) = user_with_token(&state, "alice").await;
    let (bob, _) = user_with_token(&state, "bob").await;
    let id = connections::send_request(&state.db, alice, bob).await.unwrap();
    connections::accept(&state.db, bob, id).await.unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/messages/typing")
            .insert_header(bearer(&alice_token))
            .set_json(json!({ "receiverId": bob }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    let req = test::TestRequest::post()
        .uri("/messages/typing")
        .insert_header(bearer(&alice_token))
        .set_json(json!({ "receiverId": alice }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn logout_revokes_the_credential() {
    let state = state().await;
    let (_, token) = user_with_token(&state, "alice").await;
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes::configure)).await;

    let req = test::TestRequest::post().uri("/logout").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/me").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}
