use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::manifest::{InputDef, InputType};

/// Acquisition of a single input value from the user. Implementations map
/// the input type onto their UI (text, confirm, select); cancellation is
/// reported as a `USER_CANCELLED` error and propagated verbatim.
pub trait PromptAdapter {
    fn prompt(&self, input: &InputDef) -> Result<Value>;
}

pub fn user_cancelled() -> ScaffoldError {
    ScaffoldError::new(ErrorCode::UserCancelled, "cancelled by user")
}

/// Resolve the declared inputs into a validated name -> value map.
///
/// Inputs resolve in declaration order. A conditional input whose dependency
/// does not hold is absent from the result. Provided data wins over
/// defaults; in non-interactive mode a missing required value is an error
/// instead of a prompt.
pub fn resolve_inputs(
    defs: &[InputDef],
    provided: &BTreeMap<String, Value>,
    non_interactive: bool,
    prompt: &dyn PromptAdapter,
) -> Result<BTreeMap<String, Value>> {
    let mut resolved: BTreeMap<String, Value> = BTreeMap::new();

    for def in defs {
        if let Some(condition) = &def.condition {
            let holds = resolved
                .get(&condition.input)
                .is_some_and(|v| values_equal(v, &condition.equals));
            if !holds {
                debug!("skipping input {} (condition not met)", def.name);
                continue;
            }
        }

        if let Some(value) = provided.get(&def.name) {
            let value = validate_value(def, value).map_err(|message| {
                ScaffoldError::new(
                    ErrorCode::InputValidationFailed,
                    format!("invalid value for input {:?}: {message}", def.name),
                )
                .with_detail("input", def.name.as_str())
                .with_detail("message", message)
            })?;
            resolved.insert(def.name.clone(), value);
            continue;
        }

        if non_interactive {
            match &def.default {
                Some(default) => {
                    resolved.insert(def.name.clone(), default.clone());
                }
                None if def.required => {
                    return Err(ScaffoldError::new(
                        ErrorCode::InputRequired,
                        message_for(def, "required", || {
                            format!("input {:?} is required", def.name)
                        }),
                    )
                    .with_hint(format!("provide it with -d {}=<value>", def.name))
                    .with_detail("input", def.name.as_str()));
                }
                None => {}
            }
            continue;
        }

        let value = prompt_until_valid(def, prompt)?;
        resolved.insert(def.name.clone(), value);
    }

    Ok(resolved)
}

fn prompt_until_valid(def: &InputDef, prompt: &dyn PromptAdapter) -> Result<Value> {
    loop {
        let raw = prompt.prompt(def)?;
        match validate_value(def, &raw) {
            Ok(value) => return Ok(value),
            Err(message) => debug!("rejected value for {}: {message}", def.name),
        }
    }
}

/// Validate and normalize a candidate value against an input definition.
/// Returns the user-facing message on failure, honoring per-rule overrides.
pub fn validate_value(def: &InputDef, value: &Value) -> std::result::Result<Value, String> {
    match def.kind {
        InputType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| message_for(def, "type", || "expected a string".to_owned()))?;
            if let Some(min) = def.min_length
                && s.chars().count() < min
            {
                return Err(message_for(def, "minLength", || {
                    format!("must be at least {min} characters")
                }));
            }
            if let Some(max) = def.max_length
                && s.chars().count() > max
            {
                return Err(message_for(def, "maxLength", || {
                    format!("must be at most {max} characters")
                }));
            }
            if let Some(pattern) = &def.regex {
                // Schema validation guarantees the pattern compiles.
                let re = regex::Regex::new(pattern).map_err(|e| e.to_string())?;
                if !re.is_match(s) {
                    return Err(message_for(def, "regex", || {
                        format!("must match pattern {pattern}")
                    }));
                }
            }
            Ok(Value::String(s.to_owned()))
        }
        InputType::Number => {
            let n = match value {
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| message_for(def, "type", || "expected a number".to_owned()))?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    message_for(def, "type", || format!("{s:?} is not a number"))
                })?,
                _ => return Err(message_for(def, "type", || "expected a number".to_owned())),
            };
            if n.is_nan() {
                return Err(message_for(def, "type", || "expected a number".to_owned()));
            }
            if def.integer && n.fract() != 0.0 {
                return Err(message_for(def, "integer", || {
                    "must be an integer".to_owned()
                }));
            }
            if let Some(min) = def.min
                && n < min
            {
                return Err(message_for(def, "min", || format!("must be at least {min}")));
            }
            if let Some(max) = def.max
                && n > max
            {
                return Err(message_for(def, "max", || format!("must be at most {max}")));
            }
            let number = if def.integer || n.fract() == 0.0 {
                Value::from(n as i64)
            } else {
                serde_json::Number::from_f64(n).map(Value::Number).ok_or_else(|| {
                    message_for(def, "type", || "expected a finite number".to_owned())
                })?
            };
            Ok(number)
        }
        InputType::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(message_for(def, "type", || {
                "expected true or false".to_owned()
            })),
        },
        InputType::Enum => {
            let s = value
                .as_str()
                .ok_or_else(|| message_for(def, "type", || "expected a string".to_owned()))?;
            let options = def.options.as_deref().unwrap_or_default();
            if options.iter().any(|o| o.value() == s) {
                Ok(Value::String(s.to_owned()))
            } else {
                Err(message_for(def, "options", || {
                    format!(
                        "must be one of: {}",
                        options
                            .iter()
                            .map(|o| o.value())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                }))
            }
        }
    }
}

fn message_for(def: &InputDef, rule: &str, default: impl FnOnce() -> String) -> String {
    def.messages.get(rule).cloned().unwrap_or_else(default)
}

/// Loose equality for condition checks: `true` matches `"true"` and `1`
/// matches `"1"`, since provided data often arrives as strings.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    scalar_repr(a) == scalar_repr(b)
}

fn scalar_repr(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
