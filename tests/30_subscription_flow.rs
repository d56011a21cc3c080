mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

// End-to-end gate behavior. These tests need a reachable database; when the
// server reports degraded health they skip rather than fail.

async fn database_available(base_url: &str) -> Result<bool> {
    let res = reqwest::Client::new()
        .get(format!("{}/health", base_url))
        .send()
        .await?;
    Ok(res.status() == StatusCode::OK)
}

fn unique_email(tag: &str) -> String {
    format!("{}+{}@example.com", tag, uuid_like())
}

fn uuid_like() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

async fn signup(base_url: &str, email: &str) -> Result<serde_json::Value> {
    let res = reqwest::Client::new()
        .post(format!("{}/auth/signup", base_url))
        .json(&json!({
            "agency_name": "Flow Test Realty",
            "name": "Flow Tester",
            "email": email,
            "password": "correct-horse-battery",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED, "signup failed");
    Ok(res.json().await?)
}

#[tokio::test]
async fn signup_starts_a_fourteen_day_trial() -> Result<()> {
    let server = common::ensure_server().await?;
    if !database_available(&server.base_url).await? {
        eprintln!("skipping: no database available");
        return Ok(());
    }

    let payload = signup(&server.base_url, &unique_email("trial")).await?;
    assert_eq!(payload["success"], true);

    let subscription = &payload["data"]["subscription"];
    assert_eq!(subscription["status"], "trial");
    assert_eq!(subscription["is_trial"], true);
    assert_eq!(subscription["plan_name"], "starter");
    assert!(subscription["trial_end_date"].is_string());

    // Immediate status check reports a full trial window
    let token = payload["data"]["token"].as_str().unwrap().to_string();
    let res = reqwest::Client::new()
        .get(format!("{}/api/subscription/status", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let status = res.json::<serde_json::Value>().await?;
    let decision = &status["data"]["subscription"];
    assert_eq!(decision["authorized"], true);
    assert_eq!(decision["currentPlan"], "starter");
    assert_eq!(decision["trialInfo"]["daysRemaining"], 14);
    assert_eq!(decision["trialInfo"]["isExpiringSoon"], false);
    assert!(status["data"]["upgradeUrl"].as_str().unwrap().ends_with("/subscription/upgrade"));
    Ok(())
}

#[tokio::test]
async fn duplicate_signup_email_conflicts() -> Result<()> {
    let server = common::ensure_server().await?;
    if !database_available(&server.base_url).await? {
        eprintln!("skipping: no database available");
        return Ok(());
    }

    let email = unique_email("dup");
    signup(&server.base_url, &email).await?;

    let res = reqwest::Client::new()
        .post(format!("{}/auth/signup", server.base_url))
        .json(&json!({
            "agency_name": "Another Realty",
            "name": "Someone Else",
            "email": email,
            "password": "another-password",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn trial_tenant_can_create_leads_with_usage_snapshot() -> Result<()> {
    let server = common::ensure_server().await?;
    if !database_available(&server.base_url).await? {
        eprintln!("skipping: no database available");
        return Ok(());
    }

    let payload = signup(&server.base_url, &unique_email("leads")).await?;
    let token = payload["data"]["token"].as_str().unwrap().to_string();

    let res = reqwest::Client::new()
        .post(format!("{}/api/leads", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Walk-in buyer", "phone": "+15550100" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Walk-in buyer");

    // Snapshot reflects usage before this creation on the starter plan
    let usage = &body["data"]["usage"];
    assert_eq!(usage["resourceType"], "leads");
    assert_eq!(usage["currentCount"], 0);
    assert_eq!(usage["maxAllowed"], 1000);
    Ok(())
}

#[tokio::test]
async fn starter_plan_is_denied_whatsapp_feature() -> Result<()> {
    let server = common::ensure_server().await?;
    if !database_available(&server.base_url).await? {
        eprintln!("skipping: no database available");
        return Ok(());
    }

    let payload = signup(&server.base_url, &unique_email("feature")).await?;
    let token = payload["data"]["token"].as_str().unwrap().to_string();

    let res = reqwest::Client::new()
        .post(format!("{}/api/whatsapp/send", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "phone": "+15550100", "message": "New listing!" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "FEATURE_NOT_AVAILABLE");
    assert_eq!(body["data"]["feature"], "whatsapp");
    assert_eq!(body["data"]["currentPlan"], "starter");
    assert!(body["data"]["upgradeUrl"].is_string());
    Ok(())
}
