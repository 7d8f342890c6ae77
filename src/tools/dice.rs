//! The `roll_dice` tool.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use crate::mcp::protocol::{
    JsonRpcRequest, JsonRpcResponse, RequestId, RequestParams, ServerInfo, ToolCallResult,
    ToolDefinition, METHOD_TOOLS_CALL,
};
use crate::mcp::provider::ToolProvider;

/// Name under which the tool is listed.
pub const ROLL_DICE: &str = "roll_dice";

/// Faces per die when `sides` is omitted.
pub const DEFAULT_SIDES: u32 = 6;

/// Dice rolled when `count` is omitted.
pub const DEFAULT_COUNT: u32 = 1;

const SIDES_RANGE: std::ops::RangeInclusive<u32> = 2..=1000;
const COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Validated arguments of a `roll_dice` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dice {
    /// Faces per die.
    pub sides: u32,
    /// Number of dice.
    pub count: u32,
}

impl Default for Dice {
    fn default() -> Self {
        Self {
            sides: DEFAULT_SIDES,
            count: DEFAULT_COUNT,
        }
    }
}

impl Dice {
    /// Reads `sides` and `count` from tool arguments.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for an invalid-params response when an
    /// argument is not an integer or lies outside its range.
    pub fn from_arguments(arguments: &Value) -> Result<Self, String> {
        let arguments = match arguments {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err("roll_dice arguments must be an object".to_string()),
        };

        Ok(Self {
            sides: bounded(arguments.get("sides"), "sides", DEFAULT_SIDES, &SIDES_RANGE)?,
            count: bounded(arguments.get("count"), "count", DEFAULT_COUNT, &COUNT_RANGE)?,
        })
    }

    /// Rolls the dice.
    #[must_use]
    pub fn roll(self) -> Vec<u32> {
        let mut rng = rand::thread_rng();
        (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect()
    }
}

impl std::fmt::Display for Dice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)
    }
}

fn bounded(
    value: Option<&Value>,
    name: &str,
    default: u32,
    range: &std::ops::RangeInclusive<u32>,
) -> Result<u32, String> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(default);
    };

    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| range.contains(n))
        .ok_or_else(|| {
            format!(
                "{name} must be an integer between {} and {}",
                range.start(),
                range.end()
            )
        })
}

/// Formats a roll as shown to the client, e.g. `Rolled 2d6: [3, 5] (total 8)`.
#[must_use]
pub fn describe_roll(dice: Dice, rolls: &[u32]) -> String {
    let total: u64 = rolls.iter().map(|&r| u64::from(r)).sum();
    let faces = rolls
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Rolled {dice}: [{faces}] (total {total})")
}

/// A [`ToolProvider`] offering a single `roll_dice` tool.
#[derive(Debug, Clone, Default)]
pub struct DiceRoller {
    info: ServerInfo,
}

impl DiceRoller {
    /// Creates a dice roller reporting the crate's own identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn call_tool(id: RequestId, name: &str, arguments: &Value) -> JsonRpcResponse {
        if name != ROLL_DICE {
            return tool_result(id, &ToolCallResult::error(format!("Unknown tool: {name}")));
        }

        let dice = match Dice::from_arguments(arguments) {
            Ok(dice) => dice,
            Err(message) => return JsonRpcResponse::invalid_params(id, message),
        };

        let rolls = dice.roll();
        tracing::debug!(%dice, ?rolls, "Dice rolled");
        tool_result(id, &ToolCallResult::text(describe_roll(dice, &rolls)))
    }
}

fn tool_result(id: RequestId, result: &ToolCallResult) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcResponse::internal_error(id, "failed to serialise result")
        }
    }
}

#[async_trait]
impl ToolProvider for DiceRoller {
    fn server_info(&self) -> ServerInfo {
        self.info.clone()
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: ROLL_DICE.to_string(),
            description: Some(
                "Roll one or more dice with the given number of sides and return each \
                 roll along with the total."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sides": {
                        "type": "integer",
                        "description": "Faces per die",
                        "minimum": SIDES_RANGE.start(),
                        "maximum": SIDES_RANGE.end(),
                        "default": DEFAULT_SIDES
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of dice to roll",
                        "minimum": COUNT_RANGE.start(),
                        "maximum": COUNT_RANGE.end(),
                        "default": DEFAULT_COUNT
                    }
                }
            }),
        }]
    }

    async fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.method != METHOD_TOOLS_CALL {
            return None;
        }

        let id = request.id.clone().unwrap_or_else(RequestId::unknown);
        let response = match &request.params {
            RequestParams::CallTool(params) => Self::call_tool(id, &params.name, &params.arguments),
            _ => JsonRpcResponse::invalid_params(id, "Missing tool call params"),
        };
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::decode_request;

    fn call(arguments: &str) -> JsonRpcRequest {
        let payload = format!(
            r#"{{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{{"name":"roll_dice","arguments":{arguments}}}}}"#
        );
        decode_request(payload.as_bytes()).unwrap()
    }

    fn text(response: &JsonRpcResponse) -> &str {
        response.result().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
    }

    #[test]
    fn argument_defaults() {
        assert_eq!(
            Dice::from_arguments(&Value::Null).unwrap(),
            Dice { sides: 6, count: 1 }
        );
        assert_eq!(
            Dice::from_arguments(&json!({})).unwrap(),
            Dice { sides: 6, count: 1 }
        );
        assert_eq!(
            Dice::from_arguments(&json!({"sides": 20, "count": null})).unwrap(),
            Dice { sides: 20, count: 1 }
        );
    }

    #[test]
    fn argument_bounds() {
        assert!(Dice::from_arguments(&json!({"sides": 2, "count": 100})).is_ok());
        assert!(Dice::from_arguments(&json!({"sides": 1000})).is_ok());
        assert!(Dice::from_arguments(&json!({"sides": 1})).is_err());
        assert!(Dice::from_arguments(&json!({"sides": 1001})).is_err());
        assert!(Dice::from_arguments(&json!({"count": 0})).is_err());
        assert!(Dice::from_arguments(&json!({"count": 101})).is_err());
        assert!(Dice::from_arguments(&json!({"count": -3})).is_err());
        assert!(Dice::from_arguments(&json!({"sides": "six"})).is_err());
        assert!(Dice::from_arguments(&json!({"sides": 6.5})).is_err());
        assert!(Dice::from_arguments(&json!([6])).is_err());
    }

    #[test]
    fn rolls_stay_in_range() {
        let dice = Dice { sides: 4, count: 100 };
        let rolls = dice.roll();
        assert_eq!(rolls.len(), 100);
        assert!(rolls.iter().all(|r| (1..=4).contains(r)));
    }

    #[test]
    fn describes_roll() {
        let dice = Dice { sides: 6, count: 3 };
        assert_eq!(
            describe_roll(dice, &[1, 6, 4]),
            "Rolled 3d6: [1, 6, 4] (total 11)"
        );
    }

    #[test]
    fn lists_one_tool() {
        let tools = DiceRoller::new().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, ROLL_DICE);
        let schema = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(schema["inputSchema"]["properties"]["sides"]["maximum"], 1000);
    }

    #[tokio::test]
    async fn rolls_on_call() {
        let response = DiceRoller::new()
            .handle(&call(r#"{"sides":6,"count":2}"#))
            .await
            .unwrap();
        assert_eq!(response.id.as_str(), "7");
        assert!(text(&response).starts_with("Rolled 2d6: ["));
        assert!(response.result().unwrap().get("isError").is_none());
    }

    #[tokio::test]
    async fn out_of_range_is_invalid_params() {
        let response = DiceRoller::new()
            .handle(&call(r#"{"sides":1}"#))
            .await
            .unwrap();
        assert_eq!(response.error_data().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn unknown_tool_is_tool_error() {
        let request = decode_request(
            br#"{"jsonrpc":"2.0","id":"x","method":"tools/call","params":{"name":"flip_coin"}}"#,
        )
        .unwrap();
        let response = DiceRoller::new().handle(&request).await.unwrap();
        assert_eq!(response.result().unwrap()["isError"], true);
        assert!(text(&response).contains("flip_coin"));
    }

    #[tokio::test]
    async fn missing_params_is_invalid_params() {
        let request =
            decode_request(br#"{"jsonrpc":"2.0","id":"x","method":"tools/call"}"#).unwrap();
        let response = DiceRoller::new().handle(&request).await.unwrap();
        assert_eq!(response.error_data().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn declines_other_methods() {
        let request = decode_request(br#"{"jsonrpc":"2.0","id":"x","method":"foo/bar"}"#).unwrap();
        assert!(DiceRoller::new().handle(&request).await.is_none());
    }
}
