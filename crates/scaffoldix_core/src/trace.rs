use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

/// Collects timing for the phases of a generation run.
///
/// `start`/`end` are matched by phase name. A phase without `end` reports as
/// in progress; a duplicate `end` is ignored; `end` without `start` is a
/// no-op.
#[derive(Debug, Default)]
pub struct Trace {
    phases: Vec<Phase>,
}

#[derive(Debug)]
struct Phase {
    name: String,
    context: BTreeMap<String, serde_json::Value>,
    started: Instant,
    duration_ms: Option<u128>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: &str) {
        self.start_with(name, BTreeMap::new());
    }

    pub fn start_with(&mut self, name: &str, context: BTreeMap<String, serde_json::Value>) {
        self.phases.push(Phase {
            name: name.to_owned(),
            context,
            started: Instant::now(),
            duration_ms: None,
        });
    }

    pub fn end(&mut self, name: &str) {
        if let Some(phase) = self
            .phases
            .iter_mut()
            .find(|p| p.name == name && p.duration_ms.is_none())
        {
            phase.duration_ms = Some(phase.started.elapsed().as_millis());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// One line per phase: name and duration.
    pub fn human(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            match phase.duration_ms {
                Some(ms) => writeln!(out, "{}: {ms}ms", phase.name),
                None => writeln!(out, "{}: in progress", phase.name),
            }
            .expect("writing to a String cannot fail");
        }
        out
    }

    /// Like [`Trace::human`] but with the context attached to each phase.
    pub fn detailed(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            match phase.duration_ms {
                Some(ms) => write!(out, "{}: {ms}ms", phase.name),
                None => write!(out, "{}: in progress", phase.name),
            }
            .expect("writing to a String cannot fail");
            if !phase.context.is_empty() {
                let ctx = serde_json::to_string(&phase.context).unwrap_or_default();
                write!(out, " {ctx}").expect("writing to a String cannot fail");
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let phases: Vec<serde_json::Value> = self
            .phases
            .iter()
            .map(|phase| {
                serde_json::json!({
                    "name": phase.name,
                    "durationMs": phase.duration_ms.map(|ms| ms as u64),
                    "context": phase.context,
                })
            })
            .collect();
        serde_json::json!({ "phases": phases })
    }
}
