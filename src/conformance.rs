//! Purpose: Execute JSON conformance manifests against the public promise API.
//! Exports: `Manifest`, `Step`, `Op`, `Transform`, `ThenableBehavior`, `RunOptions`, `Report`.
//! Role: Reference runner shared by the `resolvent` binary and integration tests.
//! Invariants: Steps execute in order on a single thread; handle names are unique.
//! Invariants: Usage errors always abort; expectation mismatches abort only when fail-fast.

use crate::api::{
    Deferred, Error, ErrorKind, ProgressReaction, Promise, Reaction, Reactions, ResolverState,
    Settle, Value,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

pub const CONFORMANCE_VERSION: u64 = 0;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub conformance_version: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Deferred {
        name: String,
    },
    Then {
        source: String,
        name: String,
        #[serde(default)]
        on_fulfilled: Option<Transform>,
        #[serde(default)]
        on_rejected: Option<Transform>,
        #[serde(default)]
        on_progress: Option<Transform>,
    },
    Always {
        source: String,
        name: String,
        label: String,
    },
    Resolve {
        target: String,
        #[serde(default)]
        value: JsonValue,
    },
    ResolveWith {
        target: String,
        source: String,
    },
    ResolveSelf {
        target: String,
    },
    ResolveThenable {
        target: String,
        behavior: ThenableBehavior,
        #[serde(default)]
        value: JsonValue,
    },
    Reject {
        target: String,
        #[serde(default)]
        reason: JsonValue,
    },
    Progress {
        target: String,
        #[serde(default)]
        value: JsonValue,
    },
    Expect {
        name: String,
        state: ExpectedState,
        #[serde(default)]
        value: Option<JsonValue>,
        #[serde(default)]
        error_kind: Option<String>,
    },
    ExpectLog {
        entries: Vec<JsonValue>,
    },
}

/// Transform applied by a registered reaction.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Add(f64),
    Multiply(f64),
    Prefix(String),
    Throw(String),
    Record(String),
    Constant(JsonValue),
    Adopt(String),
}

/// Scripted then-able used to exercise assimilation edge cases.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ThenableBehavior {
    Fulfill,
    Reject,
    Throw,
    FulfillThenThrow,
    FulfillTwice,
    RejectThenFulfill,
    Pending,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedState {
    Pending,
    Fulfilled,
    Rejected,
}

impl ExpectedState {
    fn label(self) -> &'static str {
        match self {
            ExpectedState::Pending => "pending",
            ExpectedState::Fulfilled => "fulfilled",
            ExpectedState::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub fail_fast: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self { fail_fast: true }
    }

    pub fn keep_going(mut self) -> Self {
        self.fail_fast = false;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Failure {
    pub step: usize,
    pub id: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub name: Option<String>,
    pub steps_run: usize,
    pub failures: Vec<Failure>,
    pub log: Vec<JsonValue>,
    pub states: BTreeMap<String, JsonValue>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest, Error> {
    let content = fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read manifest {}", path.display()))
            .with_source(err)
    })?;
    parse_manifest(&content)
}

pub fn parse_manifest(text: &str) -> Result<Manifest, Error> {
    let manifest: Manifest = serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to parse manifest json: {err}"))
            .with_source(err)
    })?;
    if manifest.conformance_version != CONFORMANCE_VERSION {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "unsupported conformance_version: {}",
            manifest.conformance_version
        )));
    }
    Ok(manifest)
}

pub fn run_manifest(manifest: &Manifest, options: &RunOptions) -> Result<Report, Error> {
    let mut run = Run::new();
    let mut failures = Vec::new();

    for (index, step) in manifest.steps.iter().enumerate() {
        tracing::debug!(step = index, id = ?step.id, "running step");
        match run.apply(&step.op) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Mismatch && !options.fail_fast => {
                failures.push(Failure {
                    step: index,
                    id: step.id.clone(),
                    message: err.message().unwrap_or_default().to_string(),
                });
            }
            Err(err) => return Err(step_err(err, index, &step.id)),
        }
    }

    let log = run.log.borrow().clone();
    Ok(Report {
        name: manifest.name.clone(),
        steps_run: manifest.steps.len(),
        failures,
        log,
        states: run.states(),
    })
}

struct Handle {
    promise: Promise<Value>,
    deferred: Option<Deferred<Value>>,
}

struct Run {
    handles: BTreeMap<String, Handle>,
    log: Rc<RefCell<Vec<JsonValue>>>,
}

impl Run {
    fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn apply(&mut self, op: &Op) -> Result<(), Error> {
        match op {
            Op::Deferred { name } => {
                let deferred = Deferred::new();
                self.insert(
                    name,
                    Handle {
                        promise: deferred.promise(),
                        deferred: Some(deferred),
                    },
                )
            }
            Op::Then {
                source,
                name,
                on_fulfilled,
                on_rejected,
                on_progress,
            } => {
                let mut reactions = Reactions::new();
                if let Some(transform) = on_fulfilled {
                    let reaction = self.reaction(transform)?;
                    reactions = reactions.on_fulfilled(reaction);
                }
                if let Some(transform) = on_rejected {
                    let reaction = self.reaction(transform)?;
                    reactions = reactions.on_rejected(reaction);
                }
                if let Some(transform) = on_progress {
                    let reaction = self.progress_reaction(transform)?;
                    reactions = reactions.on_progress(reaction);
                }
                let promise = self.promise(source)?.then(reactions);
                self.insert(
                    name,
                    Handle {
                        promise,
                        deferred: None,
                    },
                )
            }
            Op::Always {
                source,
                name,
                label,
            } => {
                let log = Rc::clone(&self.log);
                let label = label.clone();
                let promise = self
                    .promise(source)?
                    .always(move || log.borrow_mut().push(json!({ "label": label })));
                self.insert(
                    name,
                    Handle {
                        promise,
                        deferred: None,
                    },
                )
            }
            Op::Resolve { target, value } => {
                self.deferred(target)?.resolve(Value::from(value.clone()));
                Ok(())
            }
            Op::ResolveWith { target, source } => {
                let promise = self.promise(source)?;
                self.deferred(target)?.resolve(Value::Promise(promise));
                Ok(())
            }
            Op::ResolveSelf { target } => {
                let deferred = self.deferred(target)?;
                deferred.resolve(Value::Promise(deferred.promise()));
                Ok(())
            }
            Op::ResolveThenable {
                target,
                behavior,
                value,
            } => {
                let thenable = scripted_thenable(*behavior, Value::from(value.clone()));
                self.deferred(target)?.resolve(thenable);
                Ok(())
            }
            Op::Reject { target, reason } => {
                self.deferred(target)?.reject(Value::from(reason.clone()));
                Ok(())
            }
            Op::Progress { target, value } => {
                self.deferred(target)?
                    .notify_progress(Value::from(value.clone()));
                Ok(())
            }
            Op::Expect {
                name,
                state,
                value,
                error_kind,
            } => self.expect(name, *state, value.as_ref(), error_kind.as_deref()),
            Op::ExpectLog { entries } => {
                let log = self.log.borrow();
                if log.as_slice() != entries.as_slice() {
                    return Err(Error::new(ErrorKind::Mismatch).with_message(format!(
                        "log mismatch: expected {}, got {}",
                        JsonValue::Array(entries.clone()),
                        JsonValue::Array(log.clone())
                    )));
                }
                Ok(())
            }
        }
    }

    fn insert(&mut self, name: &str, handle: Handle) -> Result<(), Error> {
        if self.handles.contains_key(name) {
            return Err(
                Error::new(ErrorKind::Usage).with_message(format!("duplicate name: {name}"))
            );
        }
        self.handles.insert(name.to_string(), handle);
        Ok(())
    }

    fn handle(&self, name: &str) -> Result<&Handle, Error> {
        self.handles.get(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound).with_message(format!("unknown name: {name}"))
        })
    }

    fn promise(&self, name: &str) -> Result<Promise<Value>, Error> {
        Ok(self.handle(name)?.promise.clone())
    }

    fn deferred(&self, name: &str) -> Result<&Deferred<Value>, Error> {
        self.handle(name)?.deferred.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message(format!("{name} is not a deferred"))
        })
    }

    fn reaction(&self, transform: &Transform) -> Result<Reaction<Value>, Error> {
        let adopted = match transform {
            Transform::Adopt(name) => Some(self.promise(name)?),
            _ => None,
        };
        let transform = transform.clone();
        let log = Rc::clone(&self.log);
        Ok(Box::new(move |value: Value| match transform {
            Transform::Throw(message) => Err(Value::error(
                Error::new(ErrorKind::Callback).with_message(message),
            )),
            Transform::Record(label) => {
                log.borrow_mut()
                    .push(json!({ "label": label, "value": value.to_json() }));
                Ok(value)
            }
            Transform::Adopt(_) => Ok(adopted.map(Value::Promise).unwrap_or_else(Value::null)),
            other => apply_pure(&other, value),
        }))
    }

    fn progress_reaction(&self, transform: &Transform) -> Result<ProgressReaction<Value>, Error> {
        if matches!(transform, Transform::Throw(_) | Transform::Adopt(_)) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("progress transforms cannot throw or adopt"));
        }
        let transform = transform.clone();
        let log = Rc::clone(&self.log);
        Ok(Box::new(move |value: Value| match &transform {
            Transform::Record(label) => {
                log.borrow_mut()
                    .push(json!({ "label": label, "progress": value.to_json() }));
                value
            }
            // Progress cannot reject; a failed transform forwards the error payload.
            other => apply_pure(other, value).unwrap_or_else(|error| error),
        }))
    }

    fn expect(
        &self,
        name: &str,
        expected: ExpectedState,
        value: Option<&JsonValue>,
        error_kind: Option<&str>,
    ) -> Result<(), Error> {
        let state = self.handle(name)?.promise.state();
        if state.label() != expected.label() {
            return Err(Error::new(ErrorKind::Mismatch).with_message(format!(
                "{name}: expected {}, got {}",
                expected.label(),
                state.label()
            )));
        }
        let actual = state.value();
        if let Some(expected_value) = value {
            let rendered = actual.map(Value::to_json).unwrap_or(JsonValue::Null);
            if &rendered != expected_value {
                return Err(Error::new(ErrorKind::Mismatch).with_message(format!(
                    "{name}: expected value {expected_value}, got {rendered}"
                )));
            }
        }
        if let Some(kind) = error_kind {
            let actual_kind = actual
                .and_then(Value::as_error)
                .map(|error| error.kind().as_str());
            if actual_kind != Some(kind) {
                return Err(Error::new(ErrorKind::Mismatch).with_message(format!(
                    "{name}: expected error kind {kind}, got {}",
                    actual_kind.unwrap_or("none")
                )));
            }
        }
        Ok(())
    }

    fn states(&self) -> BTreeMap<String, JsonValue> {
        self.handles
            .iter()
            .map(|(name, handle)| (name.clone(), state_json(&handle.promise.state())))
            .collect()
    }
}

fn state_json(state: &ResolverState<Value>) -> JsonValue {
    match state.value() {
        Some(value) => json!({ "state": state.label(), "value": value.to_json() }),
        None => json!({ "state": state.label() }),
    }
}

/// `Err` carries a callback error when arithmetic meets a non-number.
fn apply_pure(transform: &Transform, value: Value) -> Result<Value, Value> {
    match transform {
        Transform::Add(operand) => Ok(number_value(operand_of("add", &value)? + operand)),
        Transform::Multiply(operand) => {
            Ok(number_value(operand_of("multiply", &value)? * operand))
        }
        Transform::Prefix(prefix) => Ok(Value::from(format!("{prefix}{value}"))),
        Transform::Constant(constant) => Ok(Value::from(constant.clone())),
        Transform::Record(_) | Transform::Throw(_) | Transform::Adopt(_) => Ok(value),
    }
}

fn operand_of(transform: &str, value: &Value) -> Result<f64, Value> {
    value.as_f64().ok_or_else(|| {
        Value::error(
            Error::new(ErrorKind::Callback)
                .with_message(format!("{transform} expects a number, got {}", value.to_json())),
        )
    })
}

// Integral results render as JSON integers so manifests can write `6`, not `6.0`.
fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

fn scripted_thenable(behavior: ThenableBehavior, value: Value) -> Value {
    Value::thenable(move |on_fulfilled: Settle<Value>, on_rejected: Settle<Value>| {
        let thrown = || {
            Value::error(Error::new(ErrorKind::Assimilation).with_message("then-able threw"))
        };
        match behavior {
            ThenableBehavior::Fulfill => on_fulfilled(value.clone()),
            ThenableBehavior::Reject => on_rejected(value.clone()),
            ThenableBehavior::Throw => return Err(thrown()),
            ThenableBehavior::FulfillThenThrow => {
                on_fulfilled(value.clone());
                return Err(thrown());
            }
            ThenableBehavior::FulfillTwice => {
                on_fulfilled(value.clone());
                on_fulfilled(Value::from("second"));
            }
            ThenableBehavior::RejectThenFulfill => {
                on_rejected(value.clone());
                on_fulfilled(value.clone());
            }
            ThenableBehavior::Pending => {}
        }
        Ok(())
    })
}

fn step_err(err: Error, index: usize, step_id: &Option<String>) -> Error {
    let message = match (step_id, err.message()) {
        (Some(id), Some(message)) => format!("{id}: {message}"),
        (Some(id), None) => id.clone(),
        (None, Some(message)) => message.to_string(),
        (None, None) => String::new(),
    };
    Error::new(err.kind()).with_message(message).with_step(index)
}
