//! Filter evaluation against decoded records.
//!
//! A [`Filter`] is prepared once per scan: field names resolve to
//! ordinals, textual literals coerce to each field's type, and regex
//! patterns compile with the case flag honored. The prepared form then
//! evaluates against each record's decoded values without further
//! allocation or parsing.

use super::ast::{BoolOp, Filter, FilterAtom, FilterNode, MatchMode, Op, Rhs};
use crate::error::{DbError, DbResult};
use crate::record::compare_scalars;
use crate::schema::{Field, Schema};
use flatdb_codec::{CodecError, DataType, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// A filter resolved against a schema, ready to test records.
#[derive(Debug)]
pub(crate) struct PreparedFilter {
    root: PreparedNode,
}

#[derive(Debug)]
enum PreparedNode {
    Atom(PreparedAtom),
    Group {
        first: Box<PreparedNode>,
        rest: Vec<(BoolOp, PreparedNode)>,
    },
}

#[derive(Debug)]
struct PreparedAtom {
    ordinal: usize,
    is_array: bool,
    op: Op,
    match_mode: MatchMode,
    negated: bool,
    rhs: PreparedRhs,
}

#[derive(Debug)]
enum PreparedRhs {
    Null,
    Scalar(Value),
    List(Vec<Value>),
    Pattern(Regex),
}

impl PreparedFilter {
    /// Resolves a filter against a schema.
    ///
    /// # Errors
    ///
    /// Returns an error when an atom names an unknown field, an `IN` atom
    /// lacks a value set, a literal cannot convert to the field's type, or
    /// a regex pattern fails to compile.
    pub(crate) fn prepare(schema: &Schema, filter: &Filter) -> DbResult<Self> {
        Ok(Self {
            root: prepare_node(schema, &filter.root)?,
        })
    }

    /// Tests a record's decoded values, in schema ordinal order.
    pub(crate) fn matches(&self, values: &[Value]) -> bool {
        eval_node(&self.root, values)
    }
}

fn prepare_node(schema: &Schema, node: &FilterNode) -> DbResult<PreparedNode> {
    match node {
        FilterNode::Atom(atom) => Ok(PreparedNode::Atom(prepare_atom(schema, atom)?)),
        FilterNode::Group(group) => {
            let first = Box::new(prepare_node(schema, &group.first)?);
            let rest = group
                .rest
                .iter()
                .map(|(op, child)| Ok((*op, prepare_node(schema, child)?)))
                .collect::<DbResult<Vec<_>>>()?;
            Ok(PreparedNode::Group { first, rest })
        }
    }
}

fn prepare_atom(schema: &Schema, atom: &FilterAtom) -> DbResult<PreparedAtom> {
    let field = schema
        .field(&atom.field)
        .ok_or_else(|| DbError::invalid_field_name(&atom.field))?;

    let rhs = match (&atom.op, &atom.rhs) {
        (Op::In, Rhs::List(values)) => {
            let coerced = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| coerce_literal(field, v))
                .collect::<DbResult<Vec<_>>>()?;
            PreparedRhs::List(coerced)
        }
        (Op::In, Rhs::Value(_)) => return Err(DbError::HashSetExpected),
        (Op::Regex, Rhs::Value(Value::Text(pattern))) => {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(atom.match_mode == MatchMode::CaseInsensitive)
                .build()
                .map_err(|e| {
                    DbError::invalid_filter(0, format!("bad regex pattern: {e}"))
                })?;
            PreparedRhs::Pattern(compiled)
        }
        (Op::Regex, _) => {
            return Err(DbError::invalid_filter(0, "REGEX requires a pattern string"))
        }
        (Op::Contains, Rhs::Value(value)) => {
            // Contains compares textual forms; no type coercion needed.
            PreparedRhs::Scalar(Value::Text(value.to_text()))
        }
        (_, Rhs::Value(Value::Null)) => PreparedRhs::Null,
        (_, Rhs::Value(value)) => PreparedRhs::Scalar(coerce_literal(field, value)?),
        (_, Rhs::List(_)) => {
            return Err(DbError::invalid_filter(0, "value list is only valid with IN"))
        }
    };

    Ok(PreparedAtom {
        ordinal: field.ordinal(),
        is_array: field.is_array(),
        op: atom.op,
        match_mode: atom.match_mode,
        negated: atom.negated,
        rhs,
    })
}

/// Coerces one literal to the field's scalar type, once per prepare.
fn coerce_literal(field: &Field, value: &Value) -> DbResult<Value> {
    // String-typed fields keep literals verbatim.
    if field.data_type() == DataType::String && !field.is_array() {
        return Ok(Value::Text(value.to_text()));
    }
    value.convert_to(field.data_type()).map_err(|e| match e {
        CodecError::CannotConvert { message, .. } => DbError::conversion(field.name(), message),
        other => DbError::Codec(other),
    })
}

fn eval_node(node: &PreparedNode, values: &[Value]) -> bool {
    match node {
        PreparedNode::Atom(atom) => eval_atom(atom, values),
        PreparedNode::Group { first, rest } => {
            let mut result = eval_node(first, values);
            for (op, child) in rest {
                // Left-to-right reduction with short-circuit
                match op {
                    BoolOp::And => {
                        if result {
                            result = eval_node(child, values);
                        }
                    }
                    BoolOp::Or => {
                        if !result {
                            result = eval_node(child, values);
                        }
                    }
                }
            }
            result
        }
    }
}

fn eval_atom(atom: &PreparedAtom, values: &[Value]) -> bool {
    // Array fields never match any predicate.
    if atom.is_array {
        return false;
    }

    let field_value = &values[atom.ordinal];
    let ci = atom.match_mode == MatchMode::CaseInsensitive;

    let result = match (&atom.op, &atom.rhs) {
        (Op::Equal, PreparedRhs::Null) => field_value.is_null(),
        (Op::NotEqual, PreparedRhs::Null) => !field_value.is_null(),
        (Op::Equal, PreparedRhs::Scalar(rhs)) => scalars_equal(field_value, rhs, ci),
        (Op::NotEqual, PreparedRhs::Scalar(rhs)) => !scalars_equal(field_value, rhs, ci),
        (Op::NotEqual | Op::Equal, _) => false,

        (
            Op::LessThan | Op::LessThanOrEqual | Op::GreaterThan | Op::GreaterThanOrEqual,
            PreparedRhs::Scalar(rhs),
        ) => {
            // Ordering against null is always false
            match compare_scalars(field_value, rhs, ci) {
                Some(order) => match atom.op {
                    Op::LessThan => order == Ordering::Less,
                    Op::LessThanOrEqual => order != Ordering::Greater,
                    Op::GreaterThan => order == Ordering::Greater,
                    Op::GreaterThanOrEqual => order != Ordering::Less,
                    _ => false,
                },
                None => false,
            }
        }
        (
            Op::LessThan | Op::LessThanOrEqual | Op::GreaterThan | Op::GreaterThanOrEqual,
            _,
        ) => false,

        (Op::In, PreparedRhs::List(candidates)) => candidates
            .iter()
            .any(|candidate| scalars_equal(field_value, candidate, ci)),
        (Op::In, _) => false,

        (Op::Contains, PreparedRhs::Scalar(Value::Text(needle))) => {
            if field_value.is_null() {
                false
            } else {
                let haystack = field_value.to_text();
                if ci {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    haystack.contains(needle.as_str())
                }
            }
        }
        (Op::Contains, _) => false,

        (Op::Regex, PreparedRhs::Pattern(pattern)) => {
            !field_value.is_null() && pattern.is_match(&field_value.to_text())
        }
        (Op::Regex, _) => false,
    };

    result != atom.negated
}

/// Equality with null semantics: null equals only null.
fn scalars_equal(a: &Value, b: &Value, case_insensitive: bool) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => {
            compare_scalars(a, b, case_insensitive) == Some(Ordering::Equal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("first", DataType::String),
            Field::new("last", DataType::String),
            Field::new("age", DataType::Int32),
            Field::new("tags", DataType::String).array(),
        ])
        .unwrap()
    }

    fn row(first: &str, last: &str, age: i32) -> Vec<Value> {
        vec![
            Value::Text(first.to_string()),
            Value::Text(last.to_string()),
            Value::Int32(age),
            Value::Array(vec![]),
        ]
    }

    fn run(filter: &str, values: &[Value]) -> bool {
        let parsed = Filter::parse(filter).unwrap();
        let prepared = PreparedFilter::prepare(&schema(), &parsed).unwrap();
        prepared.matches(values)
    }

    #[test]
    fn numeric_comparison_is_numeric_not_lexical() {
        assert!(run("age > 9", &row("a", "b", 30)));
        assert!(!run("age > 30", &row("a", "b", 30)));
        assert!(run("age >= 30", &row("a", "b", 30)));
        assert!(run("age < 100", &row("a", "b", 30)));
    }

    #[test]
    fn string_equality_respects_case_mode() {
        let values = row("Ann", "Lee", 30);
        assert!(run("first = 'Ann'", &values));
        assert!(!run("first = 'ann'", &values));
        assert!(run("~first = 'ann'", &values));
        assert!(run("first ~= 'ANN'", &values));
    }

    #[test]
    fn negation() {
        let values = row("Ann", "Lee", 30);
        assert!(run("first != 'Bob'", &values));
        assert!(!run("first != 'Ann'", &values));
        assert!(run("age NOT IN (1, 2)", &values));
    }

    #[test]
    fn null_semantics() {
        let mut values = row("Ann", "Lee", 30);
        values[1] = Value::Null;

        assert!(run("last = NULL", &values));
        assert!(!run("last = 'Lee'", &values));
        assert!(run("last != 'Lee'", &values));
        assert!(!run("first = NULL", &values));
        // Ordering against null is false
        assert!(!run("last < 'M'", &values));
        assert!(!run("last > 'A'", &values));
    }

    #[test]
    fn in_membership_with_coercion() {
        let values = row("Ann", "Lee", 30);
        assert!(run("age IN (10, 20, 30)", &values));
        assert!(!run("age IN (10, 20)", &values));
        assert!(run("~first IN ('ann', 'bob')", &values));
    }

    #[test]
    fn contains_substring() {
        let values = row("Annabelle", "Lee", 30);
        assert!(run("first CONTAINS 'nabel'", &values));
        assert!(!run("first CONTAINS 'xyz'", &values));
        assert!(run("~first CONTAINS 'ANNA'", &values));
        // Non-string fields match on their textual form
        assert!(run("age CONTAINS '3'", &values));
    }

    #[test]
    fn regex_matching() {
        let values = row("Annabelle", "Lee", 30);
        assert!(run("first REGEX '^Ann.*'", &values));
        assert!(!run("first REGEX '^Bob'", &values));
        assert!(run("~first REGEX '^ann'", &values));
    }

    #[test]
    fn group_short_circuit_left_to_right() {
        let values = row("ann", "LEE", 25);
        assert!(run("(~first = 'ann' AND last ~= 'lee') OR age > 35", &values));

        let values = row("Bob", "Smith", 40);
        assert!(run("(~first = 'ann' AND last ~= 'lee') OR age > 35", &values));

        let values = row("Bob", "Smith", 20);
        assert!(!run(
            "(~first = 'ann' AND last ~= 'lee') OR age > 35",
            &values
        ));
    }

    #[test]
    fn array_fields_never_match() {
        let mut values = row("Ann", "Lee", 30);
        values[3] = Value::Array(vec![Value::Text("x".to_string())]);
        assert!(!run("tags = 'x'", &values));
        assert!(!run("tags CONTAINS 'x'", &values));
    }

    #[test]
    fn unknown_field_rejected_at_prepare() {
        let parsed = Filter::parse("ghost = 1").unwrap();
        assert!(matches!(
            PreparedFilter::prepare(&schema(), &parsed),
            Err(DbError::InvalidFieldName { .. })
        ));
    }

    #[test]
    fn bad_literal_for_field_type_rejected_at_prepare() {
        let parsed = Filter::parse("age = 'abc'").unwrap();
        assert!(matches!(
            PreparedFilter::prepare(&schema(), &parsed),
            Err(DbError::ErrorConvertingValueForField { .. })
        ));
    }

    #[test]
    fn in_without_list_rejected() {
        let atom = FilterAtom::new("age", Op::In, 5i32);
        let filter = Filter::atom(atom);
        assert!(matches!(
            PreparedFilter::prepare(&schema(), &filter),
            Err(DbError::HashSetExpected)
        ));
    }
}
