//! Declarative validation of manifest documents.
//!
//! Runs against the raw YAML value before typed deserialization so failures
//! name the offending field path (`archetypes[0].templateRoot`) instead of a
//! serde line/column. The first failing field wins, which keeps messages
//! deterministic.

use std::collections::BTreeSet;

use serde_yaml::{Mapping, Value};

use crate::error::{ErrorCode, Result, ScaffoldError};

const INPUT_TYPES: &[&str] = &["string", "number", "boolean", "enum"];
const PATCH_KINDS: &[&str] = &[
    "insertAfterAnchor",
    "ensureBlock",
    "appendIfMissing",
    "deleteBlock",
];

pub fn validate_manifest(value: &Value) -> Result<()> {
    let root = expect_mapping(value, "$")?;

    let pack = expect_mapping(require(root, "pack", "pack")?, "pack")?;
    expect_nonempty_str(require(pack, "name", "pack.name")?, "pack.name")?;
    let version = expect_nonempty_str(require(pack, "version", "pack.version")?, "pack.version")?;
    expect_semver(version, "pack.version")?;
    if let Some(compat) = get(pack, "engineCompatibility") {
        validate_compatibility(compat, "pack.engineCompatibility")?;
    }

    let archetypes = expect_seq(
        require(root, "archetypes", "archetypes")?,
        "archetypes",
    )?;
    if archetypes.is_empty() {
        return Err(schema_err("archetypes", "must not be empty"));
    }
    let mut seen_ids = BTreeSet::new();
    for (i, archetype) in archetypes.iter().enumerate() {
        let path = format!("archetypes[{i}]");
        let id = validate_archetype(archetype, &path)?;
        if !seen_ids.insert(id.to_owned()) {
            return Err(schema_err(
                &format!("{path}.id"),
                format!("duplicate archetype id {id:?}"),
            ));
        }
    }
    Ok(())
}

fn validate_archetype<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    let archetype = expect_mapping(value, path)?;
    let id = expect_nonempty_str(
        require(archetype, "id", &format!("{path}.id"))?,
        &format!("{path}.id"),
    )?;
    let template_root = expect_nonempty_str(
        require(archetype, "templateRoot", &format!("{path}.templateRoot"))?,
        &format!("{path}.templateRoot"),
    )?;
    if template_root.starts_with('/') {
        return Err(schema_err(
            &format!("{path}.templateRoot"),
            "must be a relative path",
        ));
    }

    if let Some(inputs) = get(archetype, "inputs") {
        let inputs = expect_seq(inputs, &format!("{path}.inputs"))?;
        let mut seen_names = BTreeSet::new();
        for (i, input) in inputs.iter().enumerate() {
            let input_path = format!("{path}.inputs[{i}]");
            let name = validate_input(input, &input_path)?;
            if !seen_names.insert(name.to_owned()) {
                return Err(schema_err(
                    &format!("{input_path}.name"),
                    format!("duplicate input name {name:?}"),
                ));
            }
        }
    }

    if let Some(patches) = get(archetype, "patches") {
        let patches = expect_seq(patches, &format!("{path}.patches"))?;
        let mut seen_keys = BTreeSet::new();
        for (i, patch) in patches.iter().enumerate() {
            let patch_path = format!("{path}.patches[{i}]");
            let key = validate_patch(patch, &patch_path)?;
            if !seen_keys.insert(key.to_owned()) {
                return Err(schema_err(
                    &format!("{patch_path}.idempotencyKey"),
                    format!("duplicate idempotency key {key:?}"),
                ));
            }
        }
    }

    if let Some(hooks) = get(archetype, "hooks") {
        let hooks = expect_mapping(hooks, &format!("{path}.hooks"))?;
        if let Some(post) = get(hooks, "postGenerate") {
            expect_str_seq(post, &format!("{path}.hooks.postGenerate"))?;
        }
    }
    if let Some(checks) = get(archetype, "checks") {
        expect_str_seq(checks, &format!("{path}.checks"))?;
    }
    if let Some(rules) = get(archetype, "renameRules") {
        let rules = expect_mapping(rules, &format!("{path}.renameRules"))?;
        for (key, value) in rules {
            let key = key
                .as_str()
                .ok_or_else(|| schema_err(&format!("{path}.renameRules"), "keys must be strings"))?;
            expect_nonempty_str(value, &format!("{path}.renameRules.{key}"))?;
        }
    }
    Ok(id)
}

fn validate_input<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    let input = expect_mapping(value, path)?;
    let name = expect_nonempty_str(
        require(input, "name", &format!("{path}.name"))?,
        &format!("{path}.name"),
    )?;
    let kind = expect_nonempty_str(
        require(input, "type", &format!("{path}.type"))?,
        &format!("{path}.type"),
    )?;
    if !INPUT_TYPES.contains(&kind) {
        return Err(schema_err(
            &format!("{path}.type"),
            format!("expected one of {INPUT_TYPES:?}, got {kind:?}"),
        ));
    }
    expect_bool_if_present(input, "required", path)?;
    expect_bool_if_present(input, "integer", path)?;

    if let Some(regex) = get(input, "regex") {
        let pattern = expect_nonempty_str(regex, &format!("{path}.regex"))?;
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(schema_err(
                &format!("{path}.regex"),
                format!("invalid regular expression: {e}"),
            ));
        }
    }

    let min_length = get_u64(input, "minLength", path)?;
    let max_length = get_u64(input, "maxLength", path)?;
    if let (Some(lo), Some(hi)) = (min_length, max_length)
        && lo > hi
    {
        return Err(schema_err(
            &format!("{path}.minLength"),
            format!("minLength {lo} exceeds maxLength {hi}"),
        ));
    }

    let min = get_f64(input, "min", path)?;
    let max = get_f64(input, "max", path)?;
    if let (Some(lo), Some(hi)) = (min, max)
        && lo > hi
    {
        return Err(schema_err(
            &format!("{path}.min"),
            format!("min {lo} exceeds max {hi}"),
        ));
    }

    if kind == "enum" {
        let options = require(input, "options", &format!("{path}.options"))?;
        let options = expect_seq(options, &format!("{path}.options"))?;
        if options.is_empty() {
            return Err(schema_err(&format!("{path}.options"), "must not be empty"));
        }
        for (i, option) in options.iter().enumerate() {
            validate_enum_option(option, &format!("{path}.options[{i}]"))?;
        }
    }

    if let Some(condition) = get(input, "condition") {
        let condition = expect_mapping(condition, &format!("{path}.condition"))?;
        expect_nonempty_str(
            require(condition, "input", &format!("{path}.condition.input"))?,
            &format!("{path}.condition.input"),
        )?;
        require(condition, "equals", &format!("{path}.condition.equals"))?;
    }
    Ok(name)
}

fn validate_enum_option(value: &Value, path: &str) -> Result<()> {
    match value {
        Value::String(_) => Ok(()),
        Value::Mapping(option) => {
            expect_nonempty_str(
                require(option, "value", &format!("{path}.value"))?,
                &format!("{path}.value"),
            )?;
            expect_nonempty_str(
                require(option, "label", &format!("{path}.label"))?,
                &format!("{path}.label"),
            )?;
            Ok(())
        }
        _ => Err(schema_err(path, "expected a string or a value/label pair")),
    }
}

fn validate_patch<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    let patch = expect_mapping(value, path)?;
    let kind = expect_nonempty_str(
        require(patch, "kind", &format!("{path}.kind"))?,
        &format!("{path}.kind"),
    )?;
    if !PATCH_KINDS.contains(&kind) {
        return Err(schema_err(
            &format!("{path}.kind"),
            format!("expected one of {PATCH_KINDS:?}, got {kind:?}"),
        ));
    }
    expect_nonempty_str(
        require(patch, "file", &format!("{path}.file"))?,
        &format!("{path}.file"),
    )?;
    let key = expect_nonempty_str(
        require(patch, "idempotencyKey", &format!("{path}.idempotencyKey"))?,
        &format!("{path}.idempotencyKey"),
    )?;
    expect_bool_if_present(patch, "render", path)?;

    if kind == "insertAfterAnchor" {
        expect_nonempty_str(
            require(patch, "anchor", &format!("{path}.anchor"))?,
            &format!("{path}.anchor"),
        )?;
    }
    let has_content = get(patch, "content").is_some();
    let has_from_file = get(patch, "fromFile").is_some();
    if has_content && has_from_file {
        return Err(schema_err(
            &format!("{path}.content"),
            "content and fromFile are mutually exclusive",
        ));
    }
    if kind != "deleteBlock" && !has_content && !has_from_file {
        return Err(schema_err(
            &format!("{path}.content"),
            "either content or fromFile is required",
        ));
    }
    Ok(key)
}

fn validate_compatibility(value: &Value, path: &str) -> Result<()> {
    let compat = expect_mapping(value, path)?;
    for field in ["minVersion", "maxVersion"] {
        if let Some(version) = get(compat, field) {
            let version = expect_nonempty_str(version, &format!("{path}.{field}"))?;
            expect_semver(version, &format!("{path}.{field}"))?;
        }
    }
    if let Some(incompatible) = get(compat, "incompatible") {
        let versions = expect_str_seq(incompatible, &format!("{path}.incompatible"))?;
        for (i, version) in versions.iter().enumerate() {
            expect_semver(version, &format!("{path}.incompatible[{i}]"))?;
        }
    }
    Ok(())
}

fn schema_err(path: &str, message: impl std::fmt::Display) -> ScaffoldError {
    ScaffoldError::new(
        ErrorCode::ManifestSchemaError,
        format!("{path}: {message}"),
    )
    .with_detail("field", path)
}

fn get<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a Value> {
    mapping.get(Value::String(key.to_owned()))
}

fn require<'a>(mapping: &'a Mapping, key: &str, path: &str) -> Result<&'a Value> {
    get(mapping, key).ok_or_else(|| schema_err(path, "is required"))
}

fn expect_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| schema_err(path, "expected a mapping"))
}

fn expect_seq<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>> {
    value
        .as_sequence()
        .ok_or_else(|| schema_err(path, "expected a sequence"))
}

fn expect_nonempty_str<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    let s = value
        .as_str()
        .ok_or_else(|| schema_err(path, "expected a string"))?;
    if s.is_empty() {
        return Err(schema_err(path, "must not be empty"));
    }
    Ok(s)
}

fn expect_str_seq<'a>(value: &'a Value, path: &str) -> Result<Vec<&'a str>> {
    let seq = expect_seq(value, path)?;
    seq.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str()
                .ok_or_else(|| schema_err(&format!("{path}[{i}]"), "expected a string"))
        })
        .collect()
}

fn expect_semver(version: &str, path: &str) -> Result<()> {
    semver::Version::parse(version)
        .map(|_| ())
        .map_err(|e| schema_err(path, format!("invalid semver {version:?}: {e}")))
}

fn expect_bool_if_present(mapping: &Mapping, key: &str, parent: &str) -> Result<()> {
    match get(mapping, key) {
        Some(value) if !value.is_bool() => Err(schema_err(
            &format!("{parent}.{key}"),
            "expected a boolean",
        )),
        _ => Ok(()),
    }
}

fn get_u64(mapping: &Mapping, key: &str, parent: &str) -> Result<Option<u64>> {
    get(mapping, key)
        .map(|v| {
            v.as_u64()
                .ok_or_else(|| schema_err(&format!("{parent}.{key}"), "expected a non-negative integer"))
        })
        .transpose()
}

fn get_f64(mapping: &Mapping, key: &str, parent: &str) -> Result<Option<f64>> {
    get(mapping, key)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| schema_err(&format!("{parent}.{key}"), "expected a number"))
        })
        .transpose()
}
