//! Predicate AST.

use crate::error::DbResult;
use flatdb_codec::Value;

/// Comparison operator of a filter atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Equality.
    Equal,
    /// Inequality (`!=` / `<>`).
    NotEqual,
    /// Strictly less than.
    LessThan,
    /// Less than or equal.
    LessThanOrEqual,
    /// Strictly greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterThanOrEqual,
    /// Membership in a value set.
    In,
    /// Regular-expression match on the textual form.
    Regex,
    /// Substring match on the textual form.
    Contains,
}

/// Case handling for string comparison, `CONTAINS`, and `REGEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Exact case.
    #[default]
    CaseSensitive,
    /// Ignore case.
    CaseInsensitive,
}

/// Right-hand side of a filter atom.
#[derive(Debug, Clone, PartialEq)]
pub enum Rhs {
    /// A single comparison value (or a regex pattern for [`Op::Regex`]).
    /// `Value::Null` expresses `= NULL` / `!= NULL` tests.
    Value(Value),
    /// A value set for [`Op::In`].
    List(Vec<Value>),
}

/// One per-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterAtom {
    /// Field the predicate applies to (case-insensitive).
    pub field: String,
    /// Comparison operator.
    pub op: Op,
    /// Right-hand side.
    pub rhs: Rhs,
    /// Case handling.
    pub match_mode: MatchMode,
    /// Whether the atom's result is inverted.
    pub negated: bool,
}

impl FilterAtom {
    /// Creates a case-sensitive, non-negated atom.
    #[must_use]
    pub fn new(field: impl Into<String>, op: Op, rhs: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            rhs: Rhs::Value(rhs.into()),
            match_mode: MatchMode::CaseSensitive,
            negated: false,
        }
    }

    /// Creates an `IN` atom over a value set.
    #[must_use]
    pub fn new_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: Op::In,
            rhs: Rhs::List(values),
            match_mode: MatchMode::CaseSensitive,
            negated: false,
        }
    }

    /// Switches the atom to case-insensitive matching.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.match_mode = MatchMode::CaseInsensitive;
        self
    }

    /// Inverts the atom's result.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }
}

/// Boolean connective between group children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// Both sides must hold. Short-circuits on the first false.
    And,
    /// Either side may hold. Short-circuits on the first true.
    Or,
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// A leaf predicate.
    Atom(FilterAtom),
    /// A nested boolean group.
    Group(FilterGroup),
}

/// A boolean combination of atoms and nested groups, reduced left to right
/// with short-circuiting.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
    /// The first operand.
    pub first: Box<FilterNode>,
    /// Remaining operands, each with the connective joining it to the
    /// running result.
    pub rest: Vec<(BoolOp, FilterNode)>,
}

impl FilterGroup {
    /// Creates a group from its first operand.
    #[must_use]
    pub fn new(first: FilterNode) -> Self {
        Self {
            first: Box::new(first),
            rest: Vec::new(),
        }
    }

    /// Appends an operand with a connective.
    #[must_use]
    pub fn push(mut self, op: BoolOp, node: FilterNode) -> Self {
        self.rest.push((op, node));
        self
    }
}

/// A complete filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Root of the predicate tree.
    pub root: FilterNode,
}

impl Filter {
    /// Parses a filter string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidFilterConstruct`](crate::DbError::InvalidFilterConstruct)
    /// pointing near the offending position.
    pub fn parse(input: &str) -> DbResult<Self> {
        super::parser::parse(input)
    }

    /// Wraps a single atom as a filter.
    #[must_use]
    pub fn atom(atom: FilterAtom) -> Self {
        Self {
            root: FilterNode::Atom(atom),
        }
    }

    /// Wraps a group as a filter.
    #[must_use]
    pub fn group(group: FilterGroup) -> Self {
        Self {
            root: FilterNode::Group(group),
        }
    }
}
