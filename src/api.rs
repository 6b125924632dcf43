//! Transport-independent JSON command contract.
//!
//! [`dispatch`] takes a method, a route and an optional JSON body and answers
//! with a status code and a JSON body, the way an HTTP front end would.

use std::str::FromStr;

use log::debug;
use serde_json::{Map, Value, json};

use crate::{
    commands::CommandProcessor,
    error::{CommandError, CommandResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl FromStr for Method {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("get") {
            Ok(Self::Get)
        } else if s.eq_ignore_ascii_case("post") {
            Ok(Self::Post)
        } else {
            Err(CommandError::invalid(format!("Unsupported method {s}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(mut fields: Value) -> Self {
        if let Value::Object(map) = &mut fields {
            map.insert("status".into(), "ok".into());
        }
        Self {
            status: 200,
            body: fields,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "status": "error", "message": message.into() }),
        }
    }
}

impl From<CommandError> for ApiResponse {
    fn from(err: CommandError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }
}

/// Routes one request to the command processor.
///
/// Routes may be given with or without an `/api` prefix.
pub async fn dispatch(
    commands: &CommandProcessor,
    method: Method,
    route: &str,
    body: Option<&Value>,
) -> ApiResponse {
    let route = route.strip_prefix("/api").unwrap_or(route);
    debug!("{method:?} {route}");

    let allowed: &[Method] = match route {
        "/temperature" => &[Method::Get, Method::Post],
        "/fan" | "/mode" | "/power" | "/servo" | "/timer" => &[Method::Post],
        _ => return ApiResponse::error(404, "Not found"),
    };
    if !allowed.contains(&method) {
        return ApiResponse::error(405, "Method not allowed");
    }

    handle(commands, method, route, body)
        .await
        .unwrap_or_else(ApiResponse::from)
}

async fn handle(
    commands: &CommandProcessor,
    method: Method,
    route: &str,
    body: Option<&Value>,
) -> CommandResult<ApiResponse> {
    if (route, method) == ("/temperature", Method::Get) {
        let temperature = commands.temperature().await;
        return Ok(ApiResponse::ok(json!({ "temperature": temperature })));
    }

    let payload = object(body)?;
    let response = match route {
        "/fan" => {
            let step = int_field(payload, "step")?.unwrap_or(0);
            let speed = commands.set_fan_step(step).await?;
            json!({ "speed": speed })
        }
        "/mode" => {
            let mode = commands.set_mode(str_field(payload, "mode")?.unwrap_or("")).await?;
            json!({ "mode": mode })
        }
        "/power" => {
            if str_field(payload, "power")? == Some("off") {
                commands.power_off().await?;
            } else {
                commands.acknowledge().await;
            }
            json!({})
        }
        "/temperature" => {
            let temperature = commands
                .set_temperature(int_field(payload, "temperature")?)
                .await?;
            json!({ "temperature": temperature })
        }
        "/servo" => {
            let action = commands
                .servo(str_field(payload, "action")?.unwrap_or(""))
                .await?;
            json!({ "servo": action.as_str() })
        }
        "/timer" => {
            let hours = int_field(payload, "hours")?.unwrap_or(0);
            let minutes = int_field(payload, "minutes")?.unwrap_or(0);
            let armed = commands.arm_timer(hours, minutes).await?;
            json!({
                "message": format!("Fan will stop in {hours}h {minutes}m"),
                "timer_id": armed.id,
            })
        }
        _ => return Err(CommandError::Processing(format!("Unhandled route {route}"))),
    };
    Ok(ApiResponse::ok(response))
}

fn object(body: Option<&Value>) -> CommandResult<&Map<String, Value>> {
    body.and_then(Value::as_object)
        .ok_or_else(|| CommandError::invalid("Expected a JSON object"))
}

/// Reads an integer that may arrive as a number or a numeric string.
/// Fractional numbers are truncated toward zero.
fn int_field(payload: &Map<String, Value>, key: &str) -> CommandResult<Option<i64>> {
    let invalid = || CommandError::invalid(format!("Invalid {key}"));
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            })
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn str_field<'a>(payload: &'a Map<String, Value>, key: &str) -> CommandResult<Option<&'a str>> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(CommandError::invalid(format!("Invalid {key}"))),
    }
}
