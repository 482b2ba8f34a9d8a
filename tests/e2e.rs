//! End-to-end scenarios against a scripted stand-in browser.
//!
//! The stand-in is a small bash script that inherits the debugging pipe on
//! descriptors 3/4 like the real thing, answers the startup handshake and
//! a fixed repertoire of methods, and emits target lifecycle events. That
//! keeps `cargo test` independent of a Chromium install while still
//! driving the public API through process launch, pipe framing and session
//! multiplexing.

use std::path::PathBuf;
use std::time::Duration;

use pypecdp::cdp::browser_protocol::target::{CloseTargetParams, CreateTargetParams, TargetId};
use pypecdp::{Browser, BrowserConfig, CdpError};

/// Handshake plus a generic request loop; `$extra_cases` hooks scenario
/// specific behavior into the dispatch.
const SCRIPT_PROLOGUE: &str = r##"#!/usr/bin/env bash
set -u
send() { printf '%s\0' "$1" >&4; }
attach_first() {
  send '{"method":"Target.targetCreated","params":{"targetInfo":{"targetId":"T1","type":"page","title":"","url":"about:blank","attached":false}}}'
  send '{"method":"Target.attachedToTarget","params":{"sessionId":"S1","targetInfo":{"targetId":"T1","type":"page","title":"","url":"about:blank","attached":true},"waitingForDebugger":false}}'
}
while IFS= read -r -d '' msg <&3; do
  id=${msg#*\"id\":}
  id=${id%%[,\}]*}
  case "$msg" in
"##;

const SCRIPT_EPILOGUE: &str = r##"
    *'"method":"Target.setDiscoverTargets"'*)
      send "{\"id\":$id,\"result\":{}}"
      ;;
    *'"method":"Target.setAutoAttach"'*)
      send "{\"id\":$id,\"result\":{}}"
      attach_first
      ;;
    *'"method":"Target.createTarget"'*)
      send "{\"id\":$id,\"result\":{\"targetId\":\"T2\"}}"
      send '{"method":"Target.targetCreated","params":{"targetInfo":{"targetId":"T2","type":"page","title":"","url":"about:blank","attached":false}}}'
      send '{"method":"Target.attachedToTarget","params":{"sessionId":"S2","targetInfo":{"targetId":"T2","type":"page","title":"","url":"about:blank","attached":true},"waitingForDebugger":false}}'
      ;;
    *'"method":"Target.closeTarget"'*)
      send "{\"id\":$id,\"result\":{\"success\":true}}"
      send '{"method":"Target.detachedFromTarget","params":{"sessionId":"S2","targetId":"T2"}}'
      send '{"method":"Target.targetDestroyed","params":{"targetId":"T2"}}'
      ;;
    *'"method":"Browser.getVersion"'*)
      send "{\"id\":$id,\"result\":{\"protocolVersion\":\"1.3\",\"product\":\"FakeChrome/99.0\",\"revision\":\"r1\",\"userAgent\":\"FakeChrome\",\"jsVersion\":\"11\"}}"
      ;;
    *'"method":"Browser.close"'*)
      send "{\"id\":$id,\"result\":{}}"
      exit 0
      ;;
    *'"method":"Page.navigate"'*)
      send "{\"id\":$id,\"result\":{\"frameId\":\"F1\"},\"sessionId\":\"S1\"}"
      send '{"method":"Page.frameNavigated","params":{"frame":{"id":"F1","url":"about:blank"}},"sessionId":"S1"}'
      ;;
    *'"method":"Runtime.evaluate"'*)
      send "{\"id\":$id,\"result\":{\"result\":{\"type\":\"number\",\"value\":2}},\"sessionId\":\"S1\"}"
      ;;
    *'"method":"Runtime.callFunctionOn"'*)
      send "{\"id\":$id,\"result\":{\"result\":{\"type\":\"string\",\"value\":\"Hello\"}}}"
      ;;
    *'"method":"DOM.getDocument"'*)
      send "{\"id\":$id,\"result\":{\"root\":{\"nodeId\":1,\"backendNodeId\":1,\"nodeType\":9,\"nodeName\":\"#document\"}}}"
      ;;
    *'"method":"DOM.querySelectorAll"'*'"selector":"#missing"'*)
      send "{\"id\":$id,\"result\":{\"nodeIds\":[]}}"
      ;;
    *'"method":"DOM.querySelectorAll"'*)
      send "{\"id\":$id,\"result\":{\"nodeIds\":[2]}}"
      ;;
    *'"selector":"#missing"'*)
      send "{\"id\":$id,\"result\":{\"nodeId\":0}}"
      ;;
    *'"method":"DOM.querySelector"'*)
      send "{\"id\":$id,\"result\":{\"nodeId\":2}}"
      ;;
    *'"method":"DOM.describeNode"'*)
      send "{\"id\":$id,\"result\":{\"node\":{\"nodeId\":2,\"backendNodeId\":102,\"nodeType\":1,\"nodeName\":\"H1\"}}}"
      ;;
    *'"method":"DOM.resolveNode"'*)
      send "{\"id\":$id,\"result\":{\"object\":{\"type\":\"object\",\"objectId\":\"obj-2\"}}}"
      ;;
    *'"method":"DOM.getAttributes"'*)
      send "{\"id\":$id,\"result\":{\"attributes\":[\"class\",\"headline\",\"id\",\"title\"]}}"
      ;;
    *'"method":"DOM.getBoxModel"'*)
      send "{\"id\":$id,\"result\":{\"model\":{\"content\":[10,10,110,10,110,60,10,60],\"padding\":[10,10,110,10,110,60,10,60],\"border\":[10,10,110,10,110,60,10,60],\"margin\":[10,10,110,10,110,60,10,60],\"width\":100,\"height\":50}}}"
      ;;
    *'"method":"Input.dispatchKeyEvent"'*)
      t=${msg#*\"type\":\"}
      t=${t%%\"*}
      echo "$t" >> "${PYPECDP_TEST_KEYLOG:-/dev/null}"
      send "{\"id\":$id,\"result\":{}}"
      ;;
    *)
      send "{\"id\":$id,\"result\":{}}"
      ;;
  esac
done
exit 0
"##;

/// Write the stand-in browser to disk and point a config at it.
fn fake_browser(dir: &std::path::Path, extra_cases: &str) -> BrowserConfig {
    use std::os::unix::fs::PermissionsExt;

    let script: PathBuf = dir.join("fake-chrome.sh");
    let body = format!("{SCRIPT_PROLOGUE}{extra_cases}{SCRIPT_EPILOGUE}");
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    BrowserConfig::builder()
        .chrome_path(script)
        .startup_timeout(Duration::from_secs(10))
        .env(
            "PYPECDP_TEST_KEYLOG",
            dir.join("keylog").display().to_string(),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn happy_command_round_trip_and_idempotent_close() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Browser::start(fake_browser(dir.path(), "")).await.unwrap();

    let version = browser.version().await.unwrap();
    assert!(!version.product.is_empty());

    browser.close().await.unwrap();
    // Closing twice is a no-op.
    browser.close().await.unwrap();
}

#[tokio::test]
async fn navigate_and_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Browser::start(fake_browser(dir.path(), "")).await.unwrap();

    let tab = browser.navigate("about:blank").await.unwrap();
    assert!(tab.is_attached());

    let value = tab.evaluate("1+1").await.unwrap();
    assert_eq!(value.value, Some(serde_json::json!(2)));

    browser.close().await.unwrap();
}

#[tokio::test]
async fn selector_wait_times_out_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Browser::start(fake_browser(dir.path(), "")).await.unwrap();
    let tab = browser.navigate("about:blank").await.unwrap();

    let started = std::time::Instant::now();
    let err = tab
        .wait_for_element("#missing", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert!(started.elapsed() < Duration::from_millis(400));

    browser.close().await.unwrap();
}

#[tokio::test]
async fn element_queries_and_interaction() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Browser::start(fake_browser(dir.path(), "")).await.unwrap();
    let tab = browser.navigate("about:blank").await.unwrap();

    let elem = tab
        .find_element("h1")
        .await
        .unwrap()
        .expect("selector should match");

    assert_eq!(elem.attribute("class").await.unwrap().as_deref(), Some("headline"));
    assert_eq!(elem.attribute("data-x").await.unwrap(), None);
    assert_eq!(elem.inner_text().await.unwrap().as_deref(), Some("Hello"));

    // The click stays on the same document, so no tab comes back.
    assert!(elem.click().await.unwrap().is_none());
    elem.scroll_into_view().await.unwrap();

    // Each printable character goes out as keyDown, char, keyUp; the
    // stand-in logs every dispatched key event type.
    elem.type_str("hi").await.unwrap();
    let keylog = std::fs::read_to_string(dir.path().join("keylog")).unwrap();
    let events: Vec<&str> = keylog.lines().collect();
    assert_eq!(
        events,
        ["keyDown", "char", "keyUp", "keyDown", "char", "keyUp"]
    );

    browser.close().await.unwrap();
}

#[tokio::test]
async fn crashed_browser_surfaces_connection_lost_and_close_still_works() {
    let dir = tempfile::tempdir().unwrap();
    // Answers the handshake, attaches the first tab, then dies.
    let crash_case = r#"
    *'"method":"Target.setDiscoverTargets"'*)
      send "{\"id\":$id,\"result\":{}}"
      ;;
    *'"method":"Target.setAutoAttach"'*)
      send "{\"id\":$id,\"result\":{}}"
      attach_first
      exit 1
      ;;
"#;
    let browser = Browser::start(fake_browser(dir.path(), crash_case))
        .await
        .unwrap();
    let tab = browser.tabs().into_iter().next().unwrap();

    // The pipe EOF propagates shortly after startup; from then on every
    // operation reports the lost connection.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match tab.evaluate("1+1").await {
            Err(CdpError::ConnectionLost) => break,
            Err(err) => panic!("expected connection lost, got {err:?}"),
            Ok(_) => {
                assert!(std::time::Instant::now() < deadline, "never saw the crash");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    browser.close().await.unwrap();
}

#[tokio::test]
async fn closing_a_target_detaches_its_tab() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Browser::start(fake_browser(dir.path(), "")).await.unwrap();

    browser
        .execute(CreateTargetParams::default())
        .await
        .unwrap();

    // The auto-attached second tab shows up in the tab list.
    let second = {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(tab) = browser
                .tabs()
                .into_iter()
                .find(|t| t.target_id().inner() == "T2")
            {
                break tab;
            }
            assert!(std::time::Instant::now() < deadline, "second tab never attached");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };

    browser
        .execute(CloseTargetParams::new(TargetId::new("T2")))
        .await
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while second.is_attached() {
        assert!(std::time::Instant::now() < deadline, "tab never detached");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Detached, not a protocol error.
    let err = second.evaluate("1+1").await.unwrap_err();
    assert!(err.is_detached(), "got {err:?}");

    // The first tab is unaffected.
    let first = browser
        .tabs()
        .into_iter()
        .find(|t| t.target_id().inner() == "T1")
        .unwrap();
    assert!(first.evaluate("1+1").await.is_ok());

    browser.close().await.unwrap();
}
