/// Recursive evaluation of condition trees.

use super::{
    CompositeCondition, Condition, EnumCondition, EnumOperator, LogicalOperator,
    NumericCondition, NumericOperator, StringCondition, StringOperator,
};
use crate::error::EvaluationError;
use crate::runtime::{json_type_name, lookup_path, ValueSource};
use serde_json::Value;
use std::collections::HashMap;

/// Data a condition can read from
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub params: &'a Value,
    pub node_outputs: &'a HashMap<String, Value>,
}

impl<'a> EvaluationInput<'a> {
    pub fn new(params: &'a Value, node_outputs: &'a HashMap<String, Value>) -> Self {
        Self {
            params,
            node_outputs,
        }
    }

    /// Resolve `field` from the declared source
    fn field(
        &self,
        source: ValueSource,
        node_id: Option<&str>,
        field: &str,
    ) -> Result<&'a Value, EvaluationError> {
        let document = match source {
            ValueSource::TaskParams => self.params,
            ValueSource::NodeOutputs => {
                let node_id = node_id
                    .filter(|id| !id.is_empty())
                    .ok_or(EvaluationError::MissingNodeId)?;
                self.node_outputs
                    .get(node_id)
                    .ok_or_else(|| EvaluationError::MissingNodeOutput(node_id.to_string()))?
            }
            ValueSource::Context => {
                return Err(EvaluationError::UnsupportedSource(
                    source.as_str().to_string(),
                ))
            }
        };

        if !document.is_object() {
            return Err(EvaluationError::MalformedJson(format!(
                "{} must be a JSON object, found {}",
                source.as_str(),
                json_type_name(document)
            )));
        }

        lookup_path(document, field).ok_or_else(|| EvaluationError::MissingField(field.to_string()))
    }
}

/// Evaluates a [`Condition`] tree against task data.
///
/// Composite nodes recurse through the same function, so there is no
/// registry back-reference to wire up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        condition: &Condition,
        input: &EvaluationInput<'_>,
    ) -> Result<bool, EvaluationError> {
        let result = match condition {
            Condition::Numeric(c) => self.numeric(c, input),
            Condition::String(c) => self.string(c, input),
            Condition::Enum(c) => self.enumeration(c, input),
            Condition::Composite(c) => self.composite(c, input),
        }?;
        tracing::debug!("🔀 {} condition evaluated to {}", condition.type_name(), result);
        Ok(result)
    }

    fn numeric(
        &self,
        condition: &NumericCondition,
        input: &EvaluationInput<'_>,
    ) -> Result<bool, EvaluationError> {
        let raw = input.field(condition.source, condition.node_id.as_deref(), &condition.field)?;
        let actual = raw.as_f64().ok_or_else(|| EvaluationError::TypeMismatch {
            field: condition.field.clone(),
            expected: "number",
            found: json_type_name(raw).to_string(),
        })?;

        let expected = condition.value;
        Ok(match condition.operator {
            NumericOperator::Gt => actual > expected,
            NumericOperator::Lt => actual < expected,
            NumericOperator::Eq => actual == expected,
            NumericOperator::Gte => actual >= expected,
            NumericOperator::Lte => actual <= expected,
        })
    }

    fn string(
        &self,
        condition: &StringCondition,
        input: &EvaluationInput<'_>,
    ) -> Result<bool, EvaluationError> {
        let actual = string_field(
            input.field(condition.source, condition.node_id.as_deref(), &condition.field)?,
            &condition.field,
        )?;

        let expected = condition.value.as_str();
        Ok(match condition.operator {
            StringOperator::Eq => actual == expected,
            StringOperator::Contains => actual.contains(expected),
            StringOperator::StartsWith => actual.starts_with(expected),
            StringOperator::EndsWith => actual.ends_with(expected),
        })
    }

    fn enumeration(
        &self,
        condition: &EnumCondition,
        input: &EvaluationInput<'_>,
    ) -> Result<bool, EvaluationError> {
        let actual = string_field(
            input.field(condition.source, condition.node_id.as_deref(), &condition.field)?,
            &condition.field,
        )?;

        let member = condition.values.iter().any(|value| value == actual);
        Ok(match condition.operator {
            EnumOperator::In => member,
            EnumOperator::NotIn => !member,
        })
    }

    fn composite(
        &self,
        condition: &CompositeCondition,
        input: &EvaluationInput<'_>,
    ) -> Result<bool, EvaluationError> {
        if condition.conditions.is_empty() {
            return Err(EvaluationError::EmptyComposite);
        }

        for child in &condition.conditions {
            let result = self.evaluate(child, input)?;
            match (condition.operator, result) {
                (LogicalOperator::And, false) => return Ok(false),
                (LogicalOperator::Or, true) => return Ok(true),
                _ => {}
            }
        }
        Ok(condition.operator == LogicalOperator::And)
    }
}

fn string_field<'v>(value: &'v Value, field: &str) -> Result<&'v str, EvaluationError> {
    value.as_str().ok_or_else(|| EvaluationError::TypeMismatch {
        field: field.to_string(),
        expected: "string",
        found: json_type_name(value).to_string(),
    })
}
