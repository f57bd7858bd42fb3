use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAYEES_CSV: &str = "\
name,email,type,is_default,account_holder_name,account_holder_type,routing_number,account_number,account_type,wallet_address,blockchain
Grace Hopper,grace@example.com,US_ACH,true,,,011000015,123456789,checking,,
Grace Hopper,grace@example.com,CRYPTO_ADDRESS,false,,,,,,0xfeed,Polygon
Ada Lovelace,ada@example.com,CRYPTO_ADDRESS,false,,,,,,,
";

/// Runs the binary against `server` with no ambient configuration leaking in.
fn coinnect(server: &MockServer) -> Command {
    let mut cmd = Command::new(cargo_bin!("coinnect"));
    cmd.env_remove("RUST_LOG")
        .env_remove("PAYMAN_API_URL")
        .env_remove("COINNECT_NOTIFY_WEBHOOK")
        .env("PAYMAN_API_KEY", "test_secret")
        .env("GROQ_API_KEY", "test_key")
        .arg("--payman-url")
        .arg(server.uri())
        .arg("--llm-url")
        .arg(server.uri());
    cmd
}

async fn mount_payee_creation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/payments/payees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "pd-1" })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_balance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balances/currencies/USD"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "spendable_balance": 1250.5 })),
        )
        .mount(&server)
        .await;

    coinnect(&server)
        .arg("balance")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""currency": "USD""#))
        .stdout(predicate::str::contains("1250.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_register_from_json() {
    let server = MockServer::start().await;
    mount_payee_creation(&server).await;

    let mut json = tempfile::NamedTempFile::new().unwrap();
    write!(
        json,
        r#"{{"name": "Ada Lovelace", "email": "Ada@Example.com", "payment_methods": [
            {{"type": "CRYPTO_ADDRESS", "is_default": true,
              "crypto_details": {{"wallet_address": "0xabc", "blockchain": "Base"}}}}
        ]}}"#
    )
    .unwrap();

    let output = coinnect(&server)
        .arg("register")
        .arg(json.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let registered = report["registered"].as_array().unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0]["email"], "ada@example.com");
    assert_eq!(registered[0]["methods"][0]["external_id"], "pd-1");
    assert!(report["failed"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_import_skips_bad_rows() {
    let server = MockServer::start().await;
    mount_payee_creation(&server).await;

    let mut csv = tempfile::NamedTempFile::new().unwrap();
    csv.write_all(PAYEES_CSV.as_bytes()).unwrap();

    let output = coinnect(&server)
        .arg("import")
        .arg(csv.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let registered = report["registered"].as_array().unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0]["methods"].as_array().unwrap().len(), 2);

    let failed = report["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["source"], "line 4");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error reading payee row"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_pay_unknown_recipient_fails() {
    let server = MockServer::start().await;

    coinnect(&server)
        .args(["pay", "--email", "nobody@example.com", "--amount", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Payee not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_pay_loaded_payee_notifies_once() {
    let server = MockServer::start().await;
    mount_payee_creation(&server).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "FINAL RECOMMENDATION: ACH" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payments/send-payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "reference": "txn-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut json = tempfile::NamedTempFile::new().unwrap();
    write!(
        json,
        r#"{{"name": "Grace Hopper", "email": "grace@example.com", "payment_methods": [
            {{"type": "US_ACH", "is_default": true,
              "ach_details": {{"account_holder_name": "Grace Hopper", "account_holder_type": "individual",
                               "routing_number": "011000015", "account_number": "123456789",
                               "account_type": "checking"}}}}
        ]}}"#
    )
    .unwrap();

    let registered = coinnect(&server)
        .arg("register")
        .arg(json.path())
        .output()
        .unwrap();
    assert!(registered.status.success());
    let mut payees = tempfile::NamedTempFile::new().unwrap();
    payees.write_all(&registered.stdout).unwrap();

    let output = coinnect(&server)
        .env("COINNECT_NOTIFY_WEBHOOK", format!("{}/notify", server.uri()))
        .arg("--payees")
        .arg(payees.path())
        .args(["pay", "--email", "grace@example.com", "--amount", "1000"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["payment_method_used"], "US_ACH");
    assert_eq!(result["transaction_id"], "txn-1");
    assert_eq!(result["recommendation_used"], true);
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_rejects_non_positive_amount() {
    let server = MockServer::start().await;

    coinnect(&server)
        .args(["send", "--payee-id", "pd-1", "--amount", "0"])
        .assert()
        .failure();
}

#[cfg(not(feature = "storage-rocksdb"))]
#[tokio::test(flavor = "multi_thread")]
async fn test_rocksdb_fallback_warning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/search-payees"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    coinnect(&server)
        .arg("--db-path")
        .arg("some_db")
        .arg("search-payees")
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"))
        .stderr(predicate::str::contains("Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}
