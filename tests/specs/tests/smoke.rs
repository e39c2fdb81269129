// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `pixood` binary with mock
//! devices and drive it over REST.

use std::time::Duration;

use pixood_specs::PixoodProcess;

const TIMEOUT: Duration = Duration::from_secs(10);
const DEVICE: &str = "192.168.1.100";

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn status_and_device_registration_from_shorthand() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let status: serde_json::Value =
        reqwest::get(format!("{}/api/status", daemon.base_url())).await?.json().await?;
    assert_eq!(status["status"], "running");
    assert!(status["version"].as_str().is_some());
    assert_eq!(status["mqttStatus"]["connected"], false);

    let devices: serde_json::Value =
        reqwest::get(format!("{}/api/devices", daemon.base_url())).await?.json().await?;
    assert_eq!(devices["devices"][0]["ip"], DEVICE);
    assert_eq!(devices["devices"][0]["driver"], "mock");
    Ok(())
}

#[tokio::test]
async fn boot_scene_runs_and_scene_switch_takes_over() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    // The startup scene lands without any command.
    daemon
        .wait_device(DEVICE, TIMEOUT, |d| d["currentScene"] == "startup")
        .await?;

    let resp = client()
        .post(format!("{}/api/devices/{DEVICE}/scene", daemon.base_url()))
        .json(&serde_json::json!({"scene": "clock", "clear": true}))
        .send()
        .await?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scene"], "clock");

    let record = daemon
        .wait_device(DEVICE, TIMEOUT, |d| d["currentScene"] == "clock")
        .await?;
    assert_eq!(record["playState"], "running");
    Ok(())
}

#[tokio::test]
async fn rapid_switches_end_on_the_last_requested_scene() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let client = client();
    for scene in ["fill", "clock", "empty"] {
        client
            .post(format!("{}/api/devices/{DEVICE}/scene", daemon.base_url()))
            .json(&serde_json::json!({"scene": scene}))
            .send()
            .await?;
    }

    daemon.wait_device(DEVICE, TIMEOUT, |d| d["currentScene"] == "empty").await?;
    Ok(())
}

#[tokio::test]
async fn settings_and_scene_survive_a_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
        daemon.wait_healthy(TIMEOUT).await?;
        let client = client();

        client
            .post(format!("{}/api/devices/{DEVICE}/scene", daemon.base_url()))
            .json(&serde_json::json!({"scene": "clock"}))
            .send()
            .await?;
        daemon.wait_device(DEVICE, TIMEOUT, |d| d["currentScene"] == "clock").await?;

        let resp = client
            .post(format!("{}/api/devices/{DEVICE}/brightness", daemon.base_url()))
            .json(&serde_json::json!({"brightness": 37}))
            .send()
            .await?;
        assert!(resp.status().is_success());

        let resp = client
            .post(format!("{}/api/devices/{DEVICE}/display", daemon.base_url()))
            .json(&serde_json::json!({"on": false}))
            .send()
            .await?;
        assert!(resp.status().is_success());
        // Killed on drop; recovery must come from the persisted file.
    }

    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let record = daemon
        .wait_device(DEVICE, TIMEOUT, |d| d["currentScene"] == "clock")
        .await?;
    assert_eq!(record["brightness"], 37);
    assert_eq!(record["displayOn"], false);
    Ok(())
}

#[tokio::test]
async fn brightness_out_of_range_is_rejected_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let resp = client()
        .post(format!("{}/api/devices/{DEVICE}/brightness", daemon.base_url()))
        .json(&serde_json::json!({"brightness": 150}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await?;
    assert!(body["error"].as_str().is_some());

    let record = daemon.wait_device(DEVICE, TIMEOUT, |_| true).await?;
    assert_eq!(record["brightness"], 100, "state unchanged after reject");
    Ok(())
}

#[tokio::test]
async fn diagnostics_run_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let resp = client()
        .post(format!("{}/api/tests/run", daemon.base_url()))
        .send()
        .await?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await?;
    let Some(results) = body["results"].as_array() else {
        anyhow::bail!("results must be an array");
    };
    assert!(!results.is_empty());
    for result in results {
        assert!(
            matches!(result["status"].as_str(), Some("green" | "yellow" | "red")),
            "unexpected status in {result}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn unknown_scene_is_rejected_with_404() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = PixoodProcess::start(&format!("{DEVICE}=pixoo64:mock"), dir.path())?;
    daemon.wait_healthy(TIMEOUT).await?;

    let resp = client()
        .post(format!("{}/api/devices/{DEVICE}/scene", daemon.base_url()))
        .json(&serde_json::json!({"scene": "definitely-not-registered"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 404);
    let body: serde_json::Value = resp.json().await?;
    assert!(body["error"].as_str().is_some());
    Ok(())
}
