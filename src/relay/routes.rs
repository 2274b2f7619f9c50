//! Request dispatch for the relay endpoints.
//!
//! Everything here is synchronous: a request either produces a
//! response immediately or upgrades the connection to the multipart
//! camera stream.  The relay trusts its local network, so there is no
//! authentication on any endpoint, including /shutdown.

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::frame::{encode_png, placeholder_pixels, Frame, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};
use crate::robot::{CubeId, Rgb, Robot, MAX_HEAD_ANGLE, MIN_HEAD_ANGLE};
use crate::session::Session;

use super::http::{Request, Response};

// ── Head control ───────────────────────────────────────────

/// Browser keyCodes the control page sends.
const KEY_T: u8 = 84;
const KEY_G: u8 = 71;
const KEY_SHIFT: u8 = 16;
const KEY_ALT: u8 = 18;

/// Held-key state for driving the head.  T tilts up, G tilts down,
/// Shift doubles the rate, Alt halves it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadControl {
    head_up: bool,
    head_down: bool,
    go_fast: bool,
    go_slow: bool,
}

impl HeadControl {
    /// Record a key transition.  Returns true when the derived
    /// velocity may have changed; unknown keys are ignored.
    pub fn handle_key(&mut self, key_code: u8, pressed: bool) -> bool {
        let before = *self;
        match key_code {
            KEY_T => self.head_up = pressed,
            KEY_G => self.head_down = pressed,
            KEY_SHIFT => self.go_fast = pressed,
            KEY_ALT => self.go_slow = pressed,
            _ => {}
        }
        *self != before
    }

    fn speed(&self) -> f32 {
        if self.go_fast {
            2.0
        } else if self.go_slow {
            0.5
        } else {
            1.0
        }
    }

    /// Degrees per second; zero when both or neither direction is held.
    pub fn head_velocity(&self) -> f32 {
        let direction = match (self.head_up, self.head_down) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };
        direction * self.speed()
    }

    pub fn apply(&self, robot: &dyn Robot) -> anyhow::Result<()> {
        robot.move_head(self.head_velocity())
    }
}

// ── Dispatch ───────────────────────────────────────────────

/// What the server should do with a parsed request.
#[derive(Debug)]
pub enum RouteAction {
    /// Write this response and keep the connection for more requests.
    Respond(Response),
    /// Switch the connection to the multipart camera stream.
    StartStream,
}

/// Old IE-family engines cannot render multipart/x-mixed-replace, so
/// they get a single still instead.
fn is_legacy_browser(user_agent: &str) -> bool {
    user_agent.contains("MSIE") || user_agent.contains("Trident") || user_agent.contains("Edge")
}

#[derive(Debug, Deserialize)]
struct KeyEvent {
    #[serde(rename = "keyCode")]
    key_code: u8,
}

#[derive(Debug, Deserialize)]
struct ColorChange {
    #[serde(rename = "newColor")]
    new_color: String,
    #[serde(rename = "cubeId")]
    cube_id: String,
}

pub fn handle_request(
    session: &Session,
    control: &mut HeadControl,
    request: &Request,
) -> RouteAction {
    debug!(
        method = %request.method,
        path = %request.path,
        "relay request"
    );
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => RouteAction::Respond(Response::html(INDEX_PAGE)),
        ("GET", "/cameraImage") => camera_image(session, request),
        ("POST", "/keydown") => key_event(session, control, request, true),
        ("POST", "/keyup") => key_event(session, control, request, false),
        ("POST", "/colorChange") => color_change(session, request),
        ("POST", "/shutdown") => {
            info!("shutdown requested over the relay");
            session.request_shutdown();
            RouteAction::Respond(Response::text(200, "shutting down"))
        }
        ("POST", path) if path.starts_with("/headAngle/") => head_angle(session, path),
        (method, path) => {
            let known = matches!(
                path,
                "/" | "/cameraImage" | "/keydown" | "/keyup" | "/colorChange" | "/shutdown"
            ) || path.starts_with("/headAngle/");
            if known {
                warn!(method, path, "method not allowed");
                RouteAction::Respond(Response::text(405, "method not allowed"))
            } else {
                warn!(path, "no such page");
                RouteAction::Respond(Response::text(404, "no such page"))
            }
        }
    }
}

fn camera_image(session: &Session, request: &Request) -> RouteAction {
    let legacy = request.header("user-agent").is_some_and(is_legacy_browser);
    if !legacy {
        return RouteAction::StartStream;
    }
    let encoded = match session.frames().latest() {
        Some(frame) => encode_png(&frame),
        None => encode_png(&Frame {
            seq: 0,
            width: PLACEHOLDER_WIDTH,
            height: PLACEHOLDER_HEIGHT,
            pixels: placeholder_pixels(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT),
        }),
    };
    match encoded {
        Ok(bytes) => RouteAction::Respond(Response::png(bytes)),
        Err(err) => {
            error!("still encode failed: {}", err);
            RouteAction::Respond(Response::text(500, "encode error"))
        }
    }
}

fn key_event(
    session: &Session,
    control: &mut HeadControl,
    request: &Request,
    pressed: bool,
) -> RouteAction {
    let event: KeyEvent = match serde_json::from_slice(&request.body) {
        Ok(event) => event,
        Err(err) => {
            warn!("bad key event payload: {}", err);
            return RouteAction::Respond(Response::text(400, "bad key event"));
        }
    };
    if control.handle_key(event.key_code, pressed) {
        if let Err(err) = control.apply(session.robot()) {
            error!("head move failed: {}", err);
            return RouteAction::Respond(Response::text(500, "device error"));
        }
    }
    RouteAction::Respond(Response::text(200, "ok"))
}

fn head_angle(session: &Session, path: &str) -> RouteAction {
    let raw = &path["/headAngle/".len()..];
    let angle = match raw.parse::<f32>() {
        Ok(angle) if angle.is_finite() => angle.clamp(MIN_HEAD_ANGLE, MAX_HEAD_ANGLE),
        _ => {
            warn!(raw, "bad head angle");
            return RouteAction::Respond(Response::text(400, "bad head angle"));
        }
    };
    if let Err(err) = session.robot().set_head_angle(angle) {
        error!("head angle update failed: {}", err);
        return RouteAction::Respond(Response::text(500, "device error"));
    }
    RouteAction::Respond(Response::text(200, &format!("{:.1}", angle)))
}

fn color_change(session: &Session, request: &Request) -> RouteAction {
    let change: ColorChange = match serde_json::from_slice(&request.body) {
        Ok(change) => change,
        Err(err) => {
            warn!("bad color change payload: {}", err);
            return RouteAction::Respond(Response::text(400, "bad color change"));
        }
    };
    let Some(color) = Rgb::parse_hex(&change.new_color) else {
        warn!(color = %change.new_color, "bad color value");
        return RouteAction::Respond(Response::text(400, "bad color value"));
    };
    let Some(cube) = CubeId::parse(&change.cube_id) else {
        warn!(cube = %change.cube_id, "bad cube id");
        return RouteAction::Respond(Response::text(400, "bad cube id"));
    };
    if let Err(err) = session.robot().set_cube_light(cube, color) {
        error!("cube light update failed: {}", err);
        return RouteAction::Respond(Response::text(500, "device error"));
    }
    let body = serde_json::json!({
        "cubeId": cube.as_str(),
        "newColor": color.as_hex(),
    });
    RouteAction::Respond(Response::json(200, body.to_string()))
}

// ── Control page ───────────────────────────────────────────

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>tallybot relay</title>
<style>
body { font-family: sans-serif; margin: 2em; background: #1b1b1b; color: #ddd; }
img { border: 1px solid #444; display: block; margin-bottom: 1em; }
fieldset { border: 1px solid #444; margin-bottom: 1em; max-width: 22em; }
</style>
</head>
<body>
<h1>tallybot</h1>
<img src="/cameraImage" alt="camera" width="320" height="240">
<fieldset>
<legend>head</legend>
<p>Hold <b>T</b> to tilt up, <b>G</b> to tilt down. Shift is fast, Alt is slow.</p>
<input type="range" id="angle" min="-25" max="44.5" step="0.5" value="0">
</fieldset>
<fieldset>
<legend>cube lights</legend>
<select id="cube">
<option value="cube1">cube1</option>
<option value="cube2">cube2</option>
<option value="cube3">cube3</option>
</select>
<input type="text" id="color" value="0x00FF00" size="10">
<button id="apply">apply</button>
</fieldset>
<button id="shutdown">shut down</button>
<script>
function post(path, body) {
  fetch(path, {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body: body === undefined ? "" : JSON.stringify(body),
  });
}
document.addEventListener("keydown", function (e) {
  if (e.repeat) { return; }
  post("/keydown", {keyCode: e.keyCode});
});
document.addEventListener("keyup", function (e) {
  post("/keyup", {keyCode: e.keyCode});
});
document.getElementById("angle").addEventListener("change", function (e) {
  post("/headAngle/" + e.target.value);
});
document.getElementById("apply").addEventListener("click", function () {
  post("/colorChange", {
    newColor: document.getElementById("color").value,
    cubeId: document.getElementById("cube").value,
  });
});
document.getElementById("shutdown").addEventListener("click", function () {
  post("/shutdown");
});
</script>
</body>
</html>
"#;

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::sim::{Command, SimRobot};
    use std::sync::Arc;

    fn sim_session() -> (Arc<Session>, Arc<SimRobot>) {
        let robot = Arc::new(SimRobot::new());
        let session = Session::new(robot.clone());
        (session, robot)
    }

    fn request(method: &str, path: &str, body: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn with_agent(mut request: Request, user_agent: &str) -> Request {
        request
            .headers
            .push(("user-agent".to_string(), user_agent.to_string()));
        request
    }

    fn respond(action: RouteAction) -> Response {
        match action {
            RouteAction::Respond(response) => response,
            RouteAction::StartStream => panic!("expected a plain response"),
        }
    }

    #[test]
    fn test_index_page() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();
        let response = respond(handle_request(
            &session,
            &mut control,
            &request("GET", "/", ""),
        ));
        assert_eq!(response.status, 200);
        let page = String::from_utf8(response.body).unwrap();
        assert!(page.contains("/cameraImage"), "page embeds the camera");
    }

    #[test]
    fn test_camera_image_streams_for_modern_browsers() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();
        let req = with_agent(request("GET", "/cameraImage", ""), "Mozilla/5.0 Firefox/119.0");
        assert!(matches!(
            handle_request(&session, &mut control, &req),
            RouteAction::StartStream,
        ));
    }

    #[test]
    fn test_camera_image_still_for_legacy_browsers() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();
        let req = with_agent(
            request("GET", "/cameraImage", ""),
            "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko",
        );
        let response = respond(handle_request(&session, &mut control, &req));
        assert_eq!(response.status, 200);
        assert!(
            response.body.starts_with(b"\x89PNG\r\n\x1a\n"),
            "placeholder still is a PNG"
        );
    }

    #[test]
    fn test_key_events_drive_the_head() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();

        let action = handle_request(
            &session,
            &mut control,
            &request("POST", "/keydown", r#"{"keyCode": 84}"#),
        );
        assert_eq!(respond(action).status, 200);
        assert!(robot.commands().contains(&Command::MoveHead(1.0)));

        let action = handle_request(
            &session,
            &mut control,
            &request("POST", "/keyup", r#"{"keyCode": 84}"#),
        );
        assert_eq!(respond(action).status, 200);
        assert_eq!(robot.commands().last(), Some(&Command::MoveHead(0.0)));
    }

    #[test]
    fn test_shift_and_alt_scale_the_rate() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();

        for body in [r#"{"keyCode": 16}"#, r#"{"keyCode": 84}"#] {
            handle_request(&session, &mut control, &request("POST", "/keydown", body));
        }
        assert_eq!(robot.commands().last(), Some(&Command::MoveHead(2.0)));

        handle_request(
            &session,
            &mut control,
            &request("POST", "/keyup", r#"{"keyCode": 16}"#),
        );
        handle_request(
            &session,
            &mut control,
            &request("POST", "/keydown", r#"{"keyCode": 18}"#),
        );
        assert_eq!(robot.commands().last(), Some(&Command::MoveHead(0.5)));
    }

    #[test]
    fn test_opposed_keys_cancel() {
        let mut control = HeadControl::default();
        control.handle_key(KEY_T, true);
        control.handle_key(KEY_G, true);
        assert_eq!(control.head_velocity(), 0.0);
        control.handle_key(KEY_T, false);
        assert_eq!(control.head_velocity(), -1.0);
    }

    #[test]
    fn test_bad_key_payload_is_rejected() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();
        let response = respond(handle_request(
            &session,
            &mut control,
            &request("POST", "/keydown", "not json"),
        ));
        assert_eq!(response.status, 400);
        assert!(robot.commands().is_empty(), "no device call on bad input");
    }

    #[test]
    fn test_head_angle_applies_and_clamps() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();

        let response = respond(handle_request(
            &session,
            &mut control,
            &request("POST", "/headAngle/22.25", ""),
        ));
        assert_eq!(response.status, 200);
        assert!(robot.commands().contains(&Command::SetHeadAngle(22.25)));

        respond(handle_request(
            &session,
            &mut control,
            &request("POST", "/headAngle/90", ""),
        ));
        assert_eq!(
            robot.commands().last(),
            Some(&Command::SetHeadAngle(MAX_HEAD_ANGLE)),
        );
    }

    #[test]
    fn test_head_angle_rejects_garbage() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();
        for raw in ["banana", "NaN", "inf", ""] {
            let response = respond(handle_request(
                &session,
                &mut control,
                &request("POST", &format!("/headAngle/{}", raw), ""),
            ));
            assert_eq!(response.status, 400, "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_color_change() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();
        let response = respond(handle_request(
            &session,
            &mut control,
            &request(
                "POST",
                "/colorChange",
                r#"{"newColor": "0x00FF00", "cubeId": "cube2"}"#,
            ),
        ));
        assert_eq!(response.status, 200);
        assert!(robot
            .commands()
            .contains(&Command::SetCubeLight(CubeId::Cube2, Rgb::GREEN)));
        let echo = String::from_utf8(response.body).unwrap();
        assert!(echo.contains("cube2"), "got {:?}", echo);
    }

    #[test]
    fn test_color_change_rejects_bad_input() {
        let (session, robot) = sim_session();
        let mut control = HeadControl::default();
        for body in [
            r#"{"newColor": "green", "cubeId": "cube1"}"#,
            r#"{"newColor": "0x00FF00", "cubeId": "cube9"}"#,
            r#"{"newColor": "0x00FF00"}"#,
        ] {
            let response = respond(handle_request(
                &session,
                &mut control,
                &request("POST", "/colorChange", body),
            ));
            assert_eq!(response.status, 400, "{:?} should be rejected", body);
        }
        assert!(robot.commands().is_empty());
    }

    #[test]
    fn test_shutdown_round_trip() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();
        let response = respond(handle_request(
            &session,
            &mut control,
            &request("POST", "/shutdown", ""),
        ));
        assert_eq!(response.status, 200);
        assert!(session.is_shutdown());
    }

    #[test]
    fn test_unknown_paths_and_methods() {
        let (session, _robot) = sim_session();
        let mut control = HeadControl::default();

        let response = respond(handle_request(
            &session,
            &mut control,
            &request("GET", "/nope", ""),
        ));
        assert_eq!(response.status, 404);

        let response = respond(handle_request(
            &session,
            &mut control,
            &request("GET", "/shutdown", ""),
        ));
        assert_eq!(response.status, 405);
        assert!(!session.is_shutdown(), "GET must not shut anything down");
    }
}
