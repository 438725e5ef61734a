use std::io::{BufRead as _, Write as _};

use scaffoldix_core::{InputDef, InputType, PromptAdapter, user_cancelled};
use serde_json::Value;

/// Line-oriented prompt on stdin/stderr: free text for strings and numbers,
/// `y/n` for booleans, select-by-number for enums. EOF cancels. Invalid
/// answers are passed through so the input resolver rejects and re-prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl PromptAdapter for StdinPrompt {
    fn prompt(&self, input: &InputDef) -> scaffoldix_core::Result<Value> {
        let label = input.prompt.as_deref().unwrap_or(&input.name);
        let mut err = std::io::stderr();

        if let Some(description) = &input.description {
            let _ = writeln!(err, "{description}");
        }
        match input.kind {
            InputType::Enum => {
                let options = input.options.as_deref().unwrap_or_default();
                for (i, option) in options.iter().enumerate() {
                    let _ = writeln!(err, "  {}) {}", i + 1, option.label());
                }
                let _ = write!(err, "{label} [1-{}]: ", options.len());
            }
            InputType::Boolean => {
                let _ = write!(err, "{label} [y/n]: ");
            }
            _ => match &input.default {
                Some(default) => {
                    let _ = write!(err, "{label} [{}]: ", scalar(default));
                }
                None => {
                    let _ = write!(err, "{label}: ");
                }
            },
        }
        let _ = err.flush();

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|_| user_cancelled())?;
        if read == 0 {
            return Err(user_cancelled());
        }
        let answer = line.trim();

        if answer.is_empty()
            && let Some(default) = &input.default
        {
            return Ok(default.clone());
        }

        Ok(match input.kind {
            InputType::Boolean => match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" => Value::Bool(true),
                "n" | "no" | "false" => Value::Bool(false),
                other => Value::String(other.to_owned()),
            },
            InputType::Enum => {
                let options = input.options.as_deref().unwrap_or_default();
                match answer.parse::<usize>() {
                    Ok(i) if (1..=options.len()).contains(&i) => {
                        Value::String(options[i - 1].value().to_owned())
                    }
                    _ => Value::String(answer.to_owned()),
                }
            }
            _ => Value::String(answer.to_owned()),
        })
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
