//! Property tests for the operator mapper contracts.

use proptest::prelude::*;
use querygraph::filter::{map, Fragment};
use querygraph::{compile, ColumnRef, CompareOp, Filter, Predicate, QueryError};
use serde_json::{json, Value};

// ============================================================================
// Generators
// ============================================================================

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(2, 8, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_field() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z]{0,8}"
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_between_is_gte_and_lte(lower in any::<i64>(), upper in any::<i64>()) {
        let fragment = map("between", &json!({"lower": lower, "upper": upper})).unwrap();
        prop_assert_eq!(
            fragment,
            Fragment::All(vec![
                Fragment::Compare(CompareOp::Gte, json!(lower)),
                Fragment::Compare(CompareOp::Lte, json!(upper)),
            ])
        );
    }

    #[test]
    fn prop_not_between_is_lt_or_gt(lower in any::<i64>(), upper in any::<i64>()) {
        let fragment = map("notBetween", &json!({"lower": lower, "upper": upper})).unwrap();
        prop_assert_eq!(
            fragment,
            Fragment::Any(vec![
                Fragment::Compare(CompareOp::Lt, json!(lower)),
                Fragment::Compare(CompareOp::Gt, json!(upper)),
            ])
        );
    }

    #[test]
    fn prop_in_accepts_exactly_non_empty_arrays(operand in arb_value()) {
        let expected_ok = matches!(&operand, Value::Array(items) if !items.is_empty());
        for op in ["in", "notIn"] {
            let result = map(op, &operand);
            prop_assert_eq!(result.is_ok(), expected_ok, "{} {:?}", op, operand);
            if let Err(err) = result {
                let is_invalid_operand = matches!(err, QueryError::InvalidOperand { .. });
                prop_assert!(is_invalid_operand);
            }
        }
    }

    #[test]
    fn prop_is_accepts_only_null_and_booleans(operand in arb_value()) {
        let expected_ok = matches!(operand, Value::Null | Value::Bool(_));
        prop_assert_eq!(map("is", &operand).is_ok(), expected_ok);
        prop_assert_eq!(map("isNot", &operand).is_ok(), expected_ok);
    }

    #[test]
    fn prop_single_child_and_collapses(field in arb_field(), n in any::<i64>()) {
        let inner = Filter::new().compare(field, "eq", n);
        prop_assert_eq!(
            compile(&Filter::all_of([inner.clone()])).unwrap(),
            compile(&inner).unwrap()
        );
    }

    #[test]
    fn prop_unknown_operator_names_itself(field in arb_field(), op in "x[a-z]{2,8}") {
        let filter = Filter::new().compare(field, op.clone(), 1);
        let err = compile(&filter).unwrap_err();
        prop_assert!(err.to_string().contains(&op), "message: {}", err);
        prop_assert_eq!(err, QueryError::UnknownOperator { operator: op });
    }
}

#[test]
fn test_empty_filter_is_always_true() {
    assert_eq!(compile(&Filter::new()).unwrap(), Predicate::True);
    let parsed: Filter = serde_json::from_value(json!({})).unwrap();
    assert_eq!(compile(&parsed).unwrap(), Predicate::True);
}

#[test]
fn test_range_scenario() {
    let filter: Filter = serde_json::from_value(json!({"numberType": {"gt": 10, "lt": 20}})).unwrap();
    assert_eq!(
        compile(&filter).unwrap(),
        Predicate::All(vec![
            Predicate::compare(ColumnRef::field("numberType"), CompareOp::Gt, 10),
            Predicate::compare(ColumnRef::field("numberType"), CompareOp::Lt, 20),
        ])
    );
}
