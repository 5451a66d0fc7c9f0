mod page_server;

use predicates::prelude::*;

use page_server::PageServer;

const PAGE: &str = r#"<html><body>
  <div class="tier"><h3>Solo</h3><p class="price">$5/mo</p><ul><li>One seat</li><li>Email support</li></ul></div>
</body></html>"#;

#[test]
fn static_scrape_prints_plans_as_json() {
    let server = PageServer::spawn(PAGE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pricecards");
    let output = cmd
        .args(["scrape", "--static", "--url", &server.url("/pricing")])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let plans: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        plans,
        serde_json::json!([{
            "plan_name": "Solo",
            "price": "$5/mo",
            "pricing_model": "Tiered",
            "features": ["One seat", "Email support"],
            "billing_cycle": "monthly"
        }])
    );
}

#[test]
fn missing_page_fails_with_error_chain() {
    let server = PageServer::spawn(PAGE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pricecards");
    cmd.args(["scrape", "--static", "--url", &server.url("/gone")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("scrape:").and(predicate::str::contains("404")));
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let server = PageServer::spawn(PAGE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pricecards");
    cmd.env("RUST_LOG", "debug")
        .args(["scrape", "--static", "--url", &server.url("/pricing")])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn json_log_format_writes_json_lines() {
    let server = PageServer::spawn(PAGE);
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pricecards");
    cmd.env("RUST_LOG", "debug")
        .args([
            "--log-format",
            "json",
            "scrape",
            "--static",
            "--url",
            &server.url("/pricing"),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains(r#""message":"parsed cli""#));
}
