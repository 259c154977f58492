//! Telemetry capture: replay the human login journey in a real browser and
//! passively record the anti-automation header the site's own script
//! attaches to outgoing requests.
//!
//! The header value is produced by the target's fingerprinting script and
//! is only emitted when that script believes it is running in a real
//! browser, so the session masks the usual automation tells before
//! navigating. Selectors and page structure are external and change
//! without notice; every form interaction runs through an ordered
//! fallback list of candidates rather than a single selector.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, Headers,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

use crate::error::CaptureError;

const LOGIN_URL: &str = "https://banco.santander.cl/personas";
const TELEMETRY_HEADER: &str = "akamai-bm-telemetry";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(90);
const ENTRY_TIMEOUT: Duration = Duration::from_secs(60);
const FRAME_TIMEOUT: Duration = Duration::from_secs(20);
const FIELD_TIMEOUT: Duration = Duration::from_secs(2);
const SETTLE_DELAY: Duration = Duration::from_secs(3);
const FIELD_PAUSE: Duration = Duration::from_millis(500);
const KEY_DELAY: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const ENTRY_SELECTOR: &str = r#"a[aria-label="Ingresar al sitio privado"]"#;
const FRAME_SELECTOR: &str = "#login-frame";

/// One candidate in an ordered selector-fallback list.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub selector: &'static str,
    pub timeout: Duration,
}

const fn candidate(selector: &'static str) -> Candidate {
    Candidate {
        selector,
        timeout: FIELD_TIMEOUT,
    }
}

const USERNAME_CANDIDATES: &[Candidate] = &[
    candidate(r#"input[name="RUT"]"#),
    candidate(r#"input[id="rut"]"#),
    candidate(r#"input[aria-label="RUT"]"#),
];

const PASSWORD_CANDIDATES: &[Candidate] = &[
    candidate(r#"input[name="Clave"]"#),
    candidate(r#"input[type="password"]"#),
    candidate(r#"input[aria-label="Clave"]"#),
];

const SUBMIT_CANDIDATES: &[Candidate] = &[
    candidate(r#"button[aria-label="Ingresar"]"#),
    candidate(r#"button[type="submit"]"#),
];

/// Opaque credential emitted by the site's anti-automation script. Single
/// use: consumed by the token exchange that immediately follows capture.
/// Its content is never inspected.
#[derive(Clone, PartialEq, Eq)]
pub struct TelemetryToken(String);

impl TelemetryToken {
    pub fn new(raw: impl Into<String>) -> Self {
        TelemetryToken(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TelemetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TelemetryToken({} bytes)", self.0.len())
    }
}

/// Walk `candidates` in order; the first attempt reporting success wins.
/// Failures within the list are non-fatal and move to the next candidate;
/// exhausting the list fails the stage for `field`.
pub(crate) async fn first_success<F, Fut>(
    candidates: &[Candidate],
    field: &'static str,
    mut attempt: F,
) -> Result<&'static str, CaptureError>
where
    F: FnMut(&'static str, Duration) -> Fut,
    Fut: Future<Output = bool>,
{
    for c in candidates {
        if attempt(c.selector, c.timeout).await {
            return Ok(c.selector);
        }
        debug!(field, selector = c.selector, "candidate failed, trying next");
    }
    Err(CaptureError::LoginForm { field })
}

/// Drives one capture run. Each run owns a fresh, isolated browser
/// session; the session is released on every exit path.
#[derive(Debug, Clone)]
pub struct TelemetryCapture {
    headless: bool,
}

impl TelemetryCapture {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }

    pub async fn run(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TelemetryToken, CaptureError> {
        let mut session = Session::launch(self.headless).await?;
        let result = session.login(username, password).await;
        session.close().await;
        result
    }
}

/// Invariant: the browser is released on every exit path, including the
/// future being dropped mid-login (an end-to-end deadline firing during
/// capture). The happy and error paths go through [`Session::close`];
/// anything else goes through the [`Drop`] impl, which moves the graceful
/// close onto a detached task.
struct Session {
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    sniffer: JoinHandle<()>,
    telemetry: Arc<Mutex<Option<String>>>,
}

impl Session {
    async fn launch(headless: bool) -> Result<Session, CaptureError> {
        debug!(headless, "launching browser");

        let mut config = BrowserConfig::builder()
            .window_size(1920, 1080)
            .no_sandbox()
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--disable-setuid-sandbox",
                "--disable-web-security",
                "--disable-features=IsolateOrigins,site-per-process",
            ]);
        if !headless {
            config = config.with_head();
        }
        let config = config.build().map_err(CaptureError::Launch)?;

        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(CaptureError::Launch)?,
        )
        .await?;
        page.execute(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source("Object.defineProperty(navigator, 'webdriver', { get: () => false });")
                .build()
                .map_err(CaptureError::Launch)?,
        )
        .await?;

        // The observer must be in place before any navigation so no
        // early request is missed. Later observations overwrite earlier
        // ones; the exchange uses whatever was seen last.
        page.execute(EnableParams::default()).await?;
        let telemetry = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&telemetry);
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let sniffer = tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                if let Some(value) = header_value(&event.request.headers, TELEMETRY_HEADER) {
                    debug!("telemetry header observed");
                    if let Ok(mut slot) = sink.lock() {
                        *slot = Some(value);
                    }
                }
            }
        });

        Ok(Session {
            browser: Some(browser),
            page,
            handler,
            sniffer,
            telemetry,
        })
    }

    async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<TelemetryToken, CaptureError> {
        debug!("navigating to {LOGIN_URL}");
        match timeout(NAVIGATION_TIMEOUT, self.page.goto(LOGIN_URL)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(CaptureError::Navigation(e.to_string())),
            Err(_) => {
                return Err(CaptureError::Navigation("initial page load timed out".into()));
            }
        }

        debug!("waiting for the private-area entry control");
        if !self.wait_visible(ENTRY_SELECTOR, ENTRY_TIMEOUT).await {
            return Err(CaptureError::Navigation(
                "private-area entry control never appeared".into(),
            ));
        }
        self.click_js(ENTRY_SELECTOR).await;

        debug!("waiting for the login frame");
        if !self.wait_visible(FRAME_SELECTOR, FRAME_TIMEOUT).await {
            return Err(CaptureError::LoginFrame);
        }
        sleep(SETTLE_DELAY).await;

        self.fill_field("username", USERNAME_CANDIDATES, username).await?;
        sleep(FIELD_PAUSE).await;
        self.fill_field("password", PASSWORD_CANDIDATES, password).await?;

        debug!("submitting the login form");
        let page = self.page.clone();
        first_success(SUBMIT_CANDIDATES, "submit", |selector, t| {
            let page = page.clone();
            async move { poll_js(&page, &click_expression(selector), t).await }
        })
        .await?;

        // The fingerprinting script attaches telemetry to background
        // requests that fire after submission; give them time to go out.
        sleep(SETTLE_DELAY).await;

        let captured = self.telemetry.lock().ok().and_then(|slot| slot.clone());
        captured
            .map(TelemetryToken::new)
            .ok_or(CaptureError::TelemetryNotCaptured)
    }

    /// Focus one of the field's candidate selectors, then type the value
    /// with per-key delays through real input events.
    async fn fill_field(
        &self,
        field: &'static str,
        candidates: &[Candidate],
        value: &str,
    ) -> Result<(), CaptureError> {
        let page = self.page.clone();
        let selector = first_success(candidates, field, |selector, t| {
            let page = page.clone();
            async move { poll_js(&page, &focus_expression(selector), t).await }
        })
        .await?;
        debug!(field, selector, "field focused");

        type_text(&self.page, value).await?;
        Ok(())
    }

    /// Poll until `selector` exists in the top document, up to `limit`.
    async fn wait_visible(&self, selector: &str, limit: Duration) -> bool {
        let expr = format!(
            "document.querySelector({}) !== null",
            js_str(selector)
        );
        poll_js(&self.page, &expr, limit).await
    }

    /// Best-effort click in the top document.
    async fn click_js(&self, selector: &str) {
        let expr = format!(
            "(() => {{ const el = document.querySelector({}); if (el) el.click(); }})()",
            js_str(selector)
        );
        if let Err(e) = self.page.evaluate(expr).await {
            debug!(selector, "click evaluation failed: {e}");
        }
    }

    async fn close(&mut self) {
        self.sniffer.abort();
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        match browser.close().await {
            Ok(_) => {
                let _ = (&mut self.handler).await;
            }
            Err(e) => {
                debug!("browser close failed: {e}");
                self.handler.abort();
            }
        }
        debug!("browser session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.sniffer.abort();
        // Already released through close() on the normal paths.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let handler = self.handler.abort_handle();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = browser.close().await {
                        debug!("browser close on drop failed: {e}");
                    }
                    handler.abort();
                    debug!("browser session released after cancellation");
                });
            }
            // No runtime left to run the graceful close; dropping the
            // browser handle kills the child process.
            Err(_) => handler.abort(),
        }
    }
}

/// Case-insensitive header lookup; CDP reports header names as the
/// browser sent them.
fn header_value(headers: &Headers, name: &str) -> Option<String> {
    headers.inner().as_object()?.iter().find_map(|(k, v)| {
        if k.eq_ignore_ascii_case(name) {
            v.as_str().map(str::to_owned)
        } else {
            None
        }
    })
}

/// Evaluate a boolean expression repeatedly until it holds or `limit`
/// elapses. Evaluation errors count as "not yet".
async fn poll_js(page: &Page, expr: &str, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        let hit = match page.evaluate(expr.to_string()).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(_) => false,
        };
        if hit {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Key event triplet for one character: raw key down, text insertion,
/// key up — the stream a physical keystroke produces, which is what the
/// fingerprinting script observes.
fn key_events(ch: char) -> Result<[DispatchKeyEventParams; 3], CaptureError> {
    let down = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::RawKeyDown)
        .build()
        .map_err(CaptureError::Launch)?;
    let text = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::Char)
        .text(ch.to_string())
        .build()
        .map_err(CaptureError::Launch)?;
    let up = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyUp)
        .build()
        .map_err(CaptureError::Launch)?;
    Ok([down, text, up])
}

/// Type into whatever element currently holds focus through real
/// `Input.dispatchKeyEvent` traffic, not a DOM value assignment, with a
/// per-character delay.
async fn type_text(page: &Page, text: &str) -> Result<(), CaptureError> {
    for ch in text.chars() {
        for event in key_events(ch)? {
            page.execute(event).await?;
        }
        sleep(KEY_DELAY).await;
    }
    Ok(())
}

/// JS string literal with proper escaping.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression that locates `selector` inside the login frame's document
/// (falling back to the top document) and focuses it. Evaluates to true
/// only when the element was found.
fn focus_expression(selector: &str) -> String {
    frame_expression(selector, "el.focus(); return true;")
}

/// Same lookup as [`focus_expression`], but clicking the element.
fn click_expression(selector: &str) -> String {
    frame_expression(selector, "el.click(); return true;")
}

fn frame_expression(selector: &str, action: &str) -> String {
    format!(
        r#"(() => {{
            const frame = document.querySelector({frame});
            const doc = (frame && (frame.contentDocument ||
                (frame.contentWindow && frame.contentWindow.document))) || document;
            const el = doc.querySelector({sel});
            if (!el) return false;
            {action}
        }})()"#,
        frame = js_str(FRAME_SELECTOR),
        sel = js_str(selector),
        action = action,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_second_candidate_wins_when_first_fails() {
        let calls = AtomicUsize::new(0);
        let selected = first_success(USERNAME_CANDIDATES, "username", |_, _| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { n == 1 }
        })
        .await
        .unwrap();

        assert_eq!(selected, r#"input[id="rut"]"#);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_candidates_fail_the_field() {
        let err = first_success(PASSWORD_CANDIDATES, "password", |_, _| async { false })
            .await
            .unwrap_err();
        match err {
            CaptureError::LoginForm { field } => assert_eq!(field, "password"),
            other => panic!("expected LoginForm, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_candidates_attempted_in_declared_order() {
        let seen = Mutex::new(Vec::new());
        let _ = first_success(USERNAME_CANDIDATES, "username", |selector, _| {
            seen.lock().unwrap().push(selector);
            async { false }
        })
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                r#"input[name="RUT"]"#,
                r#"input[id="rut"]"#,
                r#"input[aria-label="RUT"]"#,
            ]
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = Headers::new(serde_json::json!({
            "Akamai-BM-Telemetry": "abc123",
            "content-type": "application/json"
        }));
        assert_eq!(
            header_value(&headers, TELEMETRY_HEADER),
            Some("abc123".to_string())
        );
        assert_eq!(header_value(&headers, "x-missing"), None);
    }

    #[test]
    fn test_frame_expression_escapes_selectors() {
        let expr = focus_expression(r#"input[name="RUT"]"#);
        assert!(expr.contains(r#""input[name=\"RUT\"]""#));
        assert!(expr.contains("contentDocument"));
    }

    #[test]
    fn test_keystrokes_emit_down_char_up() {
        let [down, text, up] = key_events('a').unwrap();
        assert!(matches!(down.r#type, DispatchKeyEventType::RawKeyDown));
        assert!(matches!(text.r#type, DispatchKeyEventType::Char));
        assert!(matches!(up.r#type, DispatchKeyEventType::KeyUp));
        assert_eq!(text.text.as_deref(), Some("a"));
        assert_eq!(down.text, None);
        assert_eq!(up.text, None);
    }

    #[test]
    fn test_telemetry_token_debug_is_opaque() {
        let token = TelemetryToken::new("sensitive-payload");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("sensitive"));
        assert!(rendered.contains("17 bytes"));
    }
}
