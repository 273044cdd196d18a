//! Unitforge MCP Server implementation
//!
//! Provides the MCP server that AI agents use to query and grow the
//! knowledge base. Implements the Model Context Protocol over stdin/stdout
//! using JSON-RPC.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{evaluate_formula, invert_formula, FeedbackReport, Formula, Scorer};
use crate::core::Agent;
use crate::error::{KbError, KbResult};
use crate::types::{TestCase, UnitPair};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

/// JSON-RPC error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// MCP Tool definition
#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

/// MCP server bound to one knowledge base
#[derive(Clone)]
pub struct UnitforgeMcpServer {
    agent: Agent,
}

impl UnitforgeMcpServer {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }

    /// Serve JSON-RPC requests line by line until stdin closes
    ///
    /// Reads from stdin forever until EOF, so it is excluded from coverage
    /// builds; request handling is tested through [`Self::handle_line`].
    #[cfg(not(coverage))]
    pub async fn run(&self) -> KbResult<()> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if let Some(reply) = self.handle_line(&line).await {
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    /// Stub for coverage builds
    #[cfg(coverage)]
    pub async fn run(&self) -> KbResult<()> {
        Ok(())
    }

    /// Handle one raw input line, returning the serialized reply if any
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(&request).await?,
            Err(e) => JsonRpcResponse::error(Value::Null, -32700, format!("Parse error: {}", e)),
        };

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::result(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {
                        "tools": {
                            "listChanged": false
                        }
                    },
                    "serverInfo": {
                        "name": "unitforge-mcp",
                        "version": env!("CARGO_PKG_VERSION")
                    },
                    "instructions": "Unitforge MCP Server - unit conversion knowledge base. Ask conversion questions (unknown formulas are learned, verified against test cases and stored with their inverse), look up stored formulas, evaluate and invert formulas, score formulas against test cases."
                }),
            )),
            "notifications/initialized" => None, // No response for notifications
            "tools/list" => Some(JsonRpcResponse::result(id, json!({ "tools": get_tools() }))),
            "tools/call" => {
                let tool_name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(json!({}));

                let result = self.call_tool(tool_name, &arguments).await;
                Some(JsonRpcResponse::result(id, result))
            }
            "ping" => Some(JsonRpcResponse::result(id, json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                -32601,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Value {
        let result = match name {
            "unitforge_ask" => self.ask(arguments).await,
            "unitforge_lookup" => self.lookup(arguments),
            "unitforge_evaluate" => evaluate(arguments),
            "unitforge_invert" => invert(arguments),
            "unitforge_score" => self.score(arguments),
            _ => return tool_text(format!("Unknown tool: {}", name), true),
        };

        match result {
            Ok(text) => tool_text(text, false),
            Err(e) => tool_text(format!("{} failed: {}", name, e), true),
        }
    }

    async fn ask(&self, arguments: &Value) -> KbResult<String> {
        let question = required_str(arguments, "question")?;
        let outcome = self.agent.ask(question).await?;
        Ok(outcome.to_string())
    }

    fn lookup(&self, arguments: &Value) -> KbResult<String> {
        let pair = UnitPair::new(
            required_str(arguments, "from_unit")?,
            required_str(arguments, "to_unit")?,
        )?;
        match self.agent.gateway().lookup(&pair)? {
            Some(formula) => Ok(formula),
            None => Ok(format!("No conversion stored for {}", pair)),
        }
    }

    fn score(&self, arguments: &Value) -> KbResult<String> {
        let formula = required_str(arguments, "formula")?;
        let cases: Vec<TestCase> = serde_json::from_value(
            arguments
                .get("test_cases")
                .cloned()
                .ok_or_else(|| missing("test_cases"))?,
        )?;

        let config = self.agent.config();
        let output = Scorer::new(config.tolerance).score(formula, &cases)?;
        if output.score >= config.acceptance_threshold {
            Ok(format!(
                "Accepted: passed {} / {} test cases (score {:.2})",
                output.passed, output.total, output.score
            ))
        } else {
            Ok(FeedbackReport::new(formula, output).to_string())
        }
    }
}

fn evaluate(arguments: &Value) -> KbResult<String> {
    let formula = required_str(arguments, "formula")?;
    let value = arguments
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| missing("value"))?;
    let variable = match arguments.get("variable").and_then(|v| v.as_str()) {
        Some(variable) => variable.to_string(),
        None => Formula::parse(formula)?.input().to_string(),
    };
    Ok(evaluate_formula(formula, &variable, value)?.to_string())
}

fn invert(arguments: &Value) -> KbResult<String> {
    Ok(invert_formula(required_str(arguments, "formula")?)?)
}

fn missing(field: &str) -> KbError {
    KbError::Validation(format!("missing argument '{}'", field))
}

fn required_str<'a>(arguments: &'a Value, field: &str) -> KbResult<&'a str> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing(field))
}

fn tool_text(text: String, is_error: bool) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text
        }],
        "isError": is_error
    })
}

/// Get all available tools
fn get_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "unitforge_ask".to_string(),
            description: "Answer a unit conversion question such as 'How do I convert meters to feet?'. Unknown conversions are learned, verified against ten test cases and stored.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "Natural-language conversion question"
                    }
                },
                "required": ["question"]
            }),
        },
        Tool {
            name: "unitforge_lookup".to_string(),
            description: "Look up the stored formula converting one unit to another.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from_unit": { "type": "string", "description": "Source unit" },
                    "to_unit": { "type": "string", "description": "Target unit" }
                },
                "required": ["from_unit", "to_unit"]
            }),
        },
        Tool {
            name: "unitforge_evaluate".to_string(),
            description: "Evaluate a formula of the form 'output = expression' for one input value.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "formula": { "type": "string", "description": "e.g. 'feet = meters * 3.28084'" },
                    "value": { "type": "number", "description": "Input value" },
                    "variable": { "type": "string", "description": "Input variable (defaults to the formula's only input)" }
                },
                "required": ["formula", "value"]
            }),
        },
        Tool {
            name: "unitforge_invert".to_string(),
            description: "Solve a conversion formula for its input, e.g. 'centimeters = meters * 100' becomes 'meters = centimeters / 100'.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "formula": { "type": "string", "description": "Formula to invert" }
                },
                "required": ["formula"]
            }),
        },
        Tool {
            name: "unitforge_score".to_string(),
            description: "Score a formula against test cases; returns correction feedback when it falls below the acceptance threshold.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "formula": { "type": "string", "description": "Formula to score" },
                    "test_cases": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "input_value": { "type": "number" },
                                "expected_output": { "type": "number" }
                            },
                            "required": ["input_value", "expected_output"]
                        }
                    }
                },
                "required": ["formula", "test_cases"]
            }),
        },
    ]
}
