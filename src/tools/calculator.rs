//! Calculator tool - basic arithmetic on two operands
//!
//! Integer operands give integer results whenever the result is exact.

use super::{Tool, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Number, Value};

pub struct CalculatorTool;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Operation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    #[serde(default)]
    operation: Operation,
    a: Number,
    b: Number,
}

fn calculate(op: Operation, a: &Number, b: &Number) -> Result<Value, String> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            Operation::Add => x.checked_add(y),
            Operation::Subtract => x.checked_sub(y),
            Operation::Multiply => x.checked_mul(y),
            Operation::Divide if y == 0 => return Err("Division by zero".to_string()),
            Operation::Divide if x.checked_rem(y) == Some(0) => x.checked_div(y),
            Operation::Divide => None,
        };
        if let Some(value) = exact {
            return Ok(json!(value));
        }
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err("Operands must be numbers".to_string());
    };
    let value = match op {
        Operation::Add => x + y,
        Operation::Subtract => x - y,
        Operation::Multiply => x * y,
        Operation::Divide if y == 0.0 => return Err("Division by zero".to_string()),
        Operation::Divide => x / y,
    };
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| "Result is not a finite number".to_string())
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> String {
        "Perform arithmetic on two numbers. Operation is one of add, subtract, multiply or divide and defaults to add.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "Arithmetic operation to apply, default add"
                },
                "a": { "type": "number", "description": "First operand" },
                "b": { "type": "number", "description": "Second operand" }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolOutput {
        let input: CalculatorInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };
        match calculate(input.operation, &input.a, &input.b) {
            Ok(value) => ToolOutput::success(value),
            Err(message) => ToolOutput::error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(input: Value) -> ToolOutput {
        CalculatorTool.run(input).await
    }

    #[tokio::test]
    async fn test_addition_defaults_and_stays_integer() {
        let out = run(json!({"a": 2, "b": 2})).await;
        assert!(out.success);
        assert_eq!(out.output, json!(4));
        assert_eq!(serde_json::to_string(&out.output).unwrap(), "4");
    }

    #[tokio::test]
    async fn test_inexact_division_falls_back_to_float() {
        let out = run(json!({"operation": "divide", "a": 7, "b": 2})).await;
        assert_eq!(out.output, json!(3.5));
        let out = run(json!({"operation": "divide", "a": 8, "b": 2})).await;
        assert_eq!(out.output, json!(4));
    }

    #[tokio::test]
    async fn test_float_operands() {
        let out = run(json!({"operation": "multiply", "a": 1.5, "b": 4})).await;
        assert_eq!(out.output, json!(6.0));
    }

    #[tokio::test]
    async fn test_overflow_falls_back_to_float() {
        let out = run(json!({"operation": "multiply", "a": i64::MAX, "b": 2})).await;
        assert!(out.success);
        assert!(out.output.as_f64().unwrap() > 1e18);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let out = run(json!({"a": "two", "b": 2})).await;
        assert!(!out.success);
        let out = run(json!({"operation": "modulo", "a": 1, "b": 2})).await;
        assert!(!out.success);
        let out = run(json!({"operation": "divide", "a": 1.0, "b": 0.0})).await;
        assert_eq!(out.output, json!("Division by zero"));
    }
}
