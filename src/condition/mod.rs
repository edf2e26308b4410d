/// Condition trees driving condition-node branching.
///
/// A [`Condition`] is a small AST: numeric, string and enum leaves that read
/// one field from the task params or a prior node's output, and composite
/// AND/OR nodes over child conditions. Serialized as `{"type": ..., "config": ...}`.

pub mod evaluator;

use crate::error::{FlowError, Result};
use crate::runtime::ValueSource;
use serde::{Deserialize, Serialize};

pub use evaluator::{ConditionEvaluator, EvaluationInput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Condition {
    Numeric(NumericCondition),
    String(StringCondition),
    Enum(EnumCondition),
    Composite(CompositeCondition),
}

impl Condition {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::Composite(_) => "composite",
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::Composite(CompositeCondition {
            operator: LogicalOperator::And,
            conditions,
        })
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Composite(CompositeCondition {
            operator: LogicalOperator::Or,
            conditions,
        })
    }

    /// Structural checks applied when the owning template is ingested
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Numeric(c) => require_field(&c.field, "numeric"),
            Self::String(c) => require_field(&c.field, "string"),
            Self::Enum(c) => require_field(&c.field, "enum"),
            Self::Composite(c) => {
                if c.conditions.is_empty() {
                    return Err(FlowError::invalid_template(
                        "composite condition requires at least one child condition",
                    ));
                }
                c.conditions.iter().try_for_each(Condition::validate)
            }
        }
    }
}

fn require_field(field: &str, kind: &str) -> Result<()> {
    if field.is_empty() {
        return Err(FlowError::invalid_template(format!(
            "{kind} condition requires a field"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericOperator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOperator {
    Eq,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumOperator {
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Compare a numeric field against `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericCondition {
    /// Dotted path of the field to read
    pub field: String,
    pub operator: NumericOperator,
    pub value: f64,
    #[serde(default)]
    pub source: ValueSource,
    /// Node whose output is read when `source` is `node_outputs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl NumericCondition {
    /// Condition over a task param
    pub fn params(field: impl Into<String>, operator: NumericOperator, value: f64) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            source: ValueSource::TaskParams,
            node_id: None,
        }
    }

    /// Condition over a field of a prior node's output
    pub fn node_output(
        node_id: impl Into<String>,
        field: impl Into<String>,
        operator: NumericOperator,
        value: f64,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            source: ValueSource::NodeOutputs,
            node_id: Some(node_id.into()),
        }
    }
}

/// Compare a string field against `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringCondition {
    pub field: String,
    pub operator: StringOperator,
    pub value: String,
    #[serde(default)]
    pub source: ValueSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl StringCondition {
    pub fn params(
        field: impl Into<String>,
        operator: StringOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            source: ValueSource::TaskParams,
            node_id: None,
        }
    }

    pub fn from_node(mut self, node_id: impl Into<String>) -> Self {
        self.source = ValueSource::NodeOutputs;
        self.node_id = Some(node_id.into());
        self
    }
}

/// Membership test of a string field in `values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumCondition {
    pub field: String,
    pub operator: EnumOperator,
    pub values: Vec<String>,
    #[serde(default)]
    pub source: ValueSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl EnumCondition {
    pub fn params(field: impl Into<String>, operator: EnumOperator, values: &[&str]) -> Self {
        Self {
            field: field.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
            source: ValueSource::TaskParams,
            node_id: None,
        }
    }
}

/// AND / OR over child conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeCondition {
    pub operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}
