//! API integration tests
//!
//! These run against a live server backed by PostgreSQL and Redis.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

async fn post(client: &Client, path: &str, body: Value) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}{}", BASE_URL, path))
        .json(&body)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

async fn get(client: &Client, path: &str) -> (StatusCode, Value) {
    let response = client
        .get(format!("{}{}", BASE_URL, path))
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Creates an author and a book with `copies` copies, returning the book id
async fn create_book(client: &Client, copies: i32) -> i64 {
    let (status, author) = post(
        client,
        "/authors",
        json!({ "first_name": "Ursula", "last_name": "Le Guin" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, book) = post(
        client,
        "/books",
        json!({
            "title": format!("The Dispossessed {}", Uuid::new_v4()),
            "author_id": author["id"],
            "total_copies": copies
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(book["available_copies"], copies);
    book["id"].as_i64().expect("No book id")
}

async fn create_member(client: &Client) -> i64 {
    let username = format!("reader-{}", Uuid::new_v4().simple());
    let (status, member) = post(
        client,
        "/members",
        json!({ "username": username, "email": format!("{}@example.org", username) }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    member["id"].as_i64().expect("No member id")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let (status, body) = get(&client, "/health").await;

    assert!(status.is_success());
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_check() {
    let client = Client::new();

    let (status, body) = get(&client, "/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_loan_and_return_restores_copies() {
    let client = Client::new();
    let book_id = create_book(&client, 2).await;
    let member_id = create_member(&client).await;

    let (status, body) = post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": member_id })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["loan"]["is_returned"], false);

    let (_, book) = get(&client, &format!("/books/{}", book_id)).await;
    assert_eq!(book["available_copies"], 1);

    let (status, body) = post(&client, &format!("/books/{}/return", book_id), json!({ "member_id": member_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loan"]["is_returned"], true);
    assert!(body["loan"]["return_date"].is_string());

    let (_, book) = get(&client, &format!("/books/{}", book_id)).await;
    assert_eq!(book["available_copies"], 2);
}

#[tokio::test]
#[ignore]
async fn test_loan_without_copies_fails() {
    let client = Client::new();
    let book_id = create_book(&client, 1).await;
    let first = create_member(&client).await;
    let second = create_member(&client).await;

    let (status, _) = post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": first })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": second })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No available copies.");
}

#[tokio::test]
#[ignore]
async fn test_loan_unknown_member_fails() {
    let client = Client::new();
    let book_id = create_book(&client, 1).await;

    let (status, body) = post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": 0 })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Member with id 0 does not exist.");
}

#[tokio::test]
#[ignore]
async fn test_return_without_loan_fails() {
    let client = Client::new();
    let book_id = create_book(&client, 1).await;
    let member_id = create_member(&client).await;

    let (status, body) = post(&client, &format!("/books/{}/return", book_id), json!({ "member_id": member_id })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Active loan does not exist.");
}

#[tokio::test]
#[ignore]
async fn test_extend_due_date() {
    let client = Client::new();
    let book_id = create_book(&client, 1).await;
    let member_id = create_member(&client).await;
    let (_, body) = post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": member_id })).await;
    let loan_id = body["loan"]["id"].as_i64().expect("No loan id");
    let due = body["loan"]["due_date"].as_str().expect("No due date").to_string();

    let (status, body) = post(
        &client,
        &format!("/loans/{}/extend-due-date", loan_id),
        json!({ "additional_days": "5" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Due date extended");
    let new_due = body["new_due_date"].as_str().expect("No new due date");
    assert!(new_due > due.as_str());

    for invalid in [json!(-3), json!("abc"), json!(0)] {
        let (status, _) = post(
            &client,
            &format!("/loans/{}/extend-due-date", loan_id),
            json!({ "additional_days": invalid }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
#[ignore]
async fn test_top_active_members() {
    let client = Client::new();
    let book_id = create_book(&client, 3).await;
    let member_id = create_member(&client).await;
    post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": member_id })).await;

    let (status, body) = get(&client, "/members/top-active").await;

    assert_eq!(status, StatusCode::OK);
    let ranking = body.as_array().expect("Expected an array");
    assert!(!ranking.is_empty() && ranking.len() <= 5);
    assert!(ranking.iter().all(|m| m["active_loans"].as_i64().unwrap_or(0) > 0));
    let counts: Vec<i64> = ranking.iter().filter_map(|m| m["active_loans"].as_i64()).collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
#[ignore]
async fn test_openapi_document() {
    let client = Client::new();

    let response = client
        .get("http://localhost:8080/api-docs/openapi.json")
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["paths"]["/books/{id}/loan"].is_object());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_loans_never_oversell() {
    const COPIES: i32 = 3;
    const BORROWERS: usize = 12;

    let client = Client::new();
    let book_id = create_book(&client, COPIES).await;
    let mut members = Vec::with_capacity(BORROWERS);
    for _ in 0..BORROWERS {
        members.push(create_member(&client).await);
    }

    let handles: Vec<_> = members
        .into_iter()
        .map(|member_id| {
            let client = client.clone();
            tokio::spawn(async move {
                post(&client, &format!("/books/{}/loan", book_id), json!({ "member_id": member_id })).await
            })
        })
        .collect();

    let mut loaned = 0;
    let mut sold_out = 0;
    for handle in handles {
        let (status, body) = handle.await.expect("Loan request task panicked");
        match status {
            StatusCode::CREATED => loaned += 1,
            StatusCode::BAD_REQUEST => {
                assert_eq!(body["error"], "NoCopyAvailable", "unexpected rejection: {body}");
                sold_out += 1;
            }
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    assert_eq!(loaned, COPIES);
    assert_eq!(sold_out, BORROWERS as i32 - COPIES);

    let (_, book) = get(&client, &format!("/books/{}", book_id)).await;
    assert_eq!(book["available_copies"], 0);

    let (_, active) = get(&client, &format!("/loans?book_id={}&active=true", book_id)).await;
    assert_eq!(active.as_array().map(Vec::len), Some(COPIES as usize));
}

#[tokio::test]
#[ignore]
async fn test_missing_loan_is_not_found() {
    let client = Client::new();

    let (status, body) = get(&client, "/loans/0").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchData");
}

#[tokio::test]
#[ignore]
async fn test_concurrent_duplicate_usernames_conflict() {
    let client = Client::new();
    let username = format!("racer-{}", Uuid::new_v4().simple());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            let body = json!({ "username": username, "email": format!("{}@example.org", username) });
            tokio::spawn(async move { post(&client, "/members", body).await })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.expect("Create request task panicked").0);
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::CREATED || *s == StatusCode::CONFLICT));
}
