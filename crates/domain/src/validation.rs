//! Command validation.
//!
//! A [`Validator`] is an ordered list of named rules. Every rule runs, even
//! after an earlier one has failed, so a rejection lists every reason a
//! command is unacceptable. Rules are pure functions of the command, the
//! current state and a [`ValidationContext`]; the wall clock reaches them
//! only through the context.

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::command::Command;

/// One or more reasons a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    reasons: Vec<String>,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }

    /// Returns `None` when there is nothing to reject.
    pub fn from_reasons(reasons: Vec<String>) -> Option<Self> {
        if reasons.is_empty() {
            None
        } else {
            Some(Self { reasons })
        }
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn into_reasons(self) -> Vec<String> {
        self.reasons
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reasons.join("; "))
    }
}

/// Result of handling a command.
///
/// `Accepted(None)` is a successful no-op: the command was valid but the
/// state already reflects it.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome<E> {
    Accepted(Option<E>),
    Rejected(Rejection),
}

impl<E> ValidationOutcome<E> {
    pub fn accept(event: E) -> Self {
        Self::Accepted(Some(event))
    }

    pub fn no_op() -> Self {
        Self::Accepted(None)
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn event(&self) -> Option<&E> {
        match self {
            Self::Accepted(event) => event.as_ref(),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Accepted(_) => None,
        }
    }

    pub fn map<F, T>(self, f: F) -> ValidationOutcome<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            Self::Accepted(event) => ValidationOutcome::Accepted(event.map(f)),
            Self::Rejected(rejection) => ValidationOutcome::Rejected(rejection),
        }
    }
}

impl<E> From<Rejection> for ValidationOutcome<E> {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// Facts about the moment of handling that rules may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    /// The identity of the aggregate handling the command.
    pub aggregate_id: AggregateId,
    pub now: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new(aggregate_id: AggregateId, now: DateTime<Utc>) -> Self {
        Self { aggregate_id, now }
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

type Rule<C, A> = Box<dyn Fn(&C, &A, &ValidationContext) -> Result<(), String> + Send + Sync>;

/// Ordered, named validation rules for command `C` against state `A`.
pub struct Validator<C, A> {
    rules: Vec<(&'static str, Rule<C, A>)>,
}

impl<C, A> Default for Validator<C, A> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<C, A> Validator<C, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Rules run in registration order.
    pub fn rule<F>(mut self, name: &'static str, rule: F) -> Self
    where
        F: Fn(&C, &A, &ValidationContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.push((name, Box::new(rule)));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(name, _)| *name)
    }

    /// Runs every rule and collects every failure.
    pub fn validate(
        &self,
        command: &C,
        state: &A,
        ctx: &ValidationContext,
    ) -> Result<(), Rejection> {
        let reasons: Vec<String> = self
            .rules
            .iter()
            .filter_map(|(name, rule)| {
                rule(command, state, ctx).err().inspect(|reason| {
                    tracing::debug!(rule = name, %reason, "validation rule failed");
                })
            })
            .collect();

        match Rejection::from_reasons(reasons) {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }
}

/// The command must target the aggregate that is handling it.
pub fn identity_matches<C: Command, A>(
    command: &C,
    _: &A,
    ctx: &ValidationContext,
) -> Result<(), String> {
    let claimed = command.aggregate_id();
    if claimed == ctx.aggregate_id {
        Ok(())
    } else {
        Err(format!(
            "command targets {claimed} but was delivered to {}",
            ctx.aggregate_id
        ))
    }
}

/// A timestamp carried by the command must not be later than now.
pub fn not_in_future<C: 'static, A>(
    field: &'static str,
    get: fn(&C) -> DateTime<Utc>,
) -> impl Fn(&C, &A, &ValidationContext) -> Result<(), String> + Send + Sync + 'static {
    move |command, _, ctx| {
        let at = get(command);
        if at > ctx.now {
            Err(format!("{field} {at} is in the future"))
        } else {
            Ok(())
        }
    }
}

/// A text field must contain something other than whitespace.
pub fn required<C: 'static, A>(
    field: &'static str,
    get: fn(&C) -> &str,
) -> impl Fn(&C, &A, &ValidationContext) -> Result<(), String> + Send + Sync + 'static {
    move |command, _, _| {
        if get(command).trim().is_empty() {
            Err(format!("{field} is required"))
        } else {
            Ok(())
        }
    }
}
