use crossterm::style::Stylize;
use serde_json::Value;

use crate::connection::Message;
use crate::error::Result;

const INDENT: &str = "  ";

/// Renders message bodies for the terminal and for the output file.
pub trait Formatter: Send + Sync {
    fn format_message(&self, message: &Message) -> Result<String>;

    fn format_for_file(&self, message: &Message) -> Result<String>;
}

/// Pretty-prints JSON objects and arrays; anything else passes through
/// untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_message(&self, message: &Message) -> Result<String> {
        Ok(match parse_structured(&message.data) {
            Some(value) => {
                let mut out = String::with_capacity(message.data.len() * 2);
                write_colored(&mut out, &value, 0);
                out
            }
            None => message.data.clone(),
        })
    }

    fn format_for_file(&self, message: &Message) -> Result<String> {
        Ok(match parse_structured(&message.data) {
            Some(value) => serde_json::to_string_pretty(&value).map_err(anyhow::Error::from)?,
            None => message.data.clone(),
        })
    }
}

fn parse_structured(data: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(data.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

fn write_colored(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str(&"null".magenta().to_string()),
        Value::Bool(b) => out.push_str(&b.to_string().magenta().to_string()),
        Value::Number(n) => out.push_str(&n.to_string().cyan().to_string()),
        Value::String(s) => out.push_str(&quote(s).green().to_string()),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Array(items) => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                push_indent(out, depth + 1);
                write_colored(out, item, depth + 1);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("{\n");
            for (i, (key, item)) in map.iter().enumerate() {
                push_indent(out, depth + 1);
                out.push_str(&quote(key).blue().to_string());
                out.push_str(": ");
                write_colored(out, item, depth + 1);
                if i + 1 < map.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            push_indent(out, depth);
            out.push('}');
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

// serde_json's own escaping, so strings look the same as in the file copy.
fn quote(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}
