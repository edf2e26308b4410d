/// Template ingest validation.

use super::graph::TemplateGraph;
use super::node_config::{NodeConfig, RejectBehavior};
use super::types::{NodeType, Template, TemplateConfig};
use crate::error::{FlowError, Result};

impl Template {
    /// Check every structural invariant a stored template must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FlowError::invalid_template("template id is required"));
        }
        if self.name.is_empty() {
            return Err(FlowError::invalid_template("template name is required"));
        }
        if self.version == 0 {
            return Err(FlowError::invalid_template("template version must be >= 1"));
        }
        if self.nodes.is_empty() {
            return Err(FlowError::invalid_template("template must contain at least one node"));
        }

        let starts: Vec<&str> = self
            .nodes
            .values()
            .filter(|node| node.node_type == NodeType::Start)
            .map(|node| node.id.as_str())
            .collect();
        if starts.len() != 1 {
            return Err(FlowError::invalid_template(format!(
                "template must contain exactly one start node, found {}",
                starts.len()
            )));
        }

        for (key, node) in &self.nodes {
            if node.id != *key {
                return Err(FlowError::invalid_template(format!(
                    "node keyed '{key}' declares id '{}'",
                    node.id
                )));
            }
            self.validate_node_config(key)?;
        }

        let graph = TemplateGraph::build(self)?;
        graph.ensure_acyclic()?;

        for node in self.nodes.values() {
            if matches!(node.node_type, NodeType::Start | NodeType::Approval)
                && graph.out_degree(&node.id) > 1
            {
                return Err(FlowError::invalid_template(format!(
                    "{} node '{}' has more than one outgoing edge; parallel branches are not supported",
                    node.node_type, node.id
                )));
            }
        }

        let orphans = graph.unreachable_from(starts[0]);
        if !orphans.is_empty() {
            tracing::warn!(
                "⚠️ Template '{}' v{} has nodes unreachable from start: {:?}",
                self.id,
                self.version,
                orphans
            );
        }

        if let Some(config) = &self.config {
            validate_template_config(config)?;
        }

        Ok(())
    }

    fn validate_node_config(&self, node_id: &str) -> Result<()> {
        let node = &self.nodes[node_id];
        match (node.node_type, &node.config) {
            (NodeType::Approval, Some(NodeConfig::Approval(config))) => {
                config
                    .validate()
                    .map_err(|e| prefix_node_error(node_id, e))?;
                if config.reject_behavior == RejectBehavior::Jump {
                    let target = config.reject_target_node.as_deref().unwrap_or_default();
                    if !self.nodes.contains_key(target) {
                        return Err(FlowError::invalid_template(format!(
                            "node '{node_id}': reject_target_node '{target}' does not exist"
                        )));
                    }
                }
                Ok(())
            }
            (NodeType::Approval, _) => Err(FlowError::invalid_template(format!(
                "approval node '{node_id}' requires an approval config"
            ))),
            (NodeType::Condition, Some(NodeConfig::Condition(config))) => {
                config
                    .validate()
                    .map_err(|e| prefix_node_error(node_id, e))?;
                for target in [&config.true_node_id, &config.false_node_id] {
                    if !self.nodes.contains_key(target) {
                        return Err(FlowError::invalid_template(format!(
                            "condition node '{node_id}' targets unknown node '{target}'"
                        )));
                    }
                }
                Ok(())
            }
            (NodeType::Condition, _) => Err(FlowError::invalid_template(format!(
                "condition node '{node_id}' requires a condition config"
            ))),
            (NodeType::Start | NodeType::End, Some(_)) => Err(FlowError::invalid_template(
                format!("{} node '{node_id}' does not take a config", node.node_type),
            )),
            (NodeType::Start | NodeType::End, None) => Ok(()),
        }
    }
}

fn prefix_node_error(node_id: &str, err: FlowError) -> FlowError {
    match err {
        FlowError::InvalidTemplate(message) => {
            FlowError::InvalidTemplate(format!("node '{node_id}': {message}"))
        }
        other => other,
    }
}

fn validate_template_config(config: &TemplateConfig) -> Result<()> {
    for webhook in &config.webhooks {
        let url = reqwest::Url::parse(&webhook.url).map_err(|e| {
            FlowError::invalid_template(format!("invalid webhook url '{}': {e}", webhook.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FlowError::invalid_template(format!(
                "webhook url '{}' must use http or https",
                webhook.url
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::approval::ApprovalMode;
    use crate::approver::ApproverConfig;
    use crate::error::FlowError;
    use crate::template::{
        ApprovalNodeConfig, Node, RejectBehavior, Template, TemplateConfig, WebhookConfig,
    };
    use assert_matches::assert_matches;

    fn approval(id: &str, users: &[&str]) -> Node {
        let approvers = users.iter().map(|u| u.to_string()).collect();
        Node::approval(
            id,
            ApprovalNodeConfig::new(ApprovalMode::Single, ApproverConfig::fixed(approvers)),
        )
    }

    fn linear() -> Template {
        Template::new("expense", "Expense approval")
            .with_node(Node::start("start"))
            .with_node(approval("manager", &["u1"]))
            .with_node(Node::end("end"))
            .with_edge("start", "manager")
            .with_edge("manager", "end")
    }

    #[test]
    fn linear_template_is_valid() {
        assert!(linear().validate().is_ok());
    }

    #[test]
    fn single_start_node_template_is_valid() {
        let template = Template::new("t", "minimal").with_node(Node::start("start"));
        assert!(template.validate().is_ok());
    }

    #[test]
    fn identity_fields_are_required() {
        let mut template = linear();
        template.name.clear();
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(_)));

        let template = Template::new("empty", "Empty");
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(_)));
    }

    #[test]
    fn exactly_one_start_node() {
        let template = linear().with_node(Node::start("second"));
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(msg)) if msg.contains("start"));
    }

    #[test]
    fn edges_must_reference_nodes() {
        let template = linear().with_edge("manager", "ghost");
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(msg)) if msg.contains("ghost"));
    }

    #[test]
    fn approval_fan_out_is_rejected() {
        let template = linear()
            .with_node(Node::end("other_end"))
            .with_edge("manager", "other_end");
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(msg)) if msg.contains("parallel"));
    }

    #[test]
    fn approval_nodes_need_configs() {
        let mut template = linear();
        if let Some(node) = template.nodes.get_mut("manager") {
            node.config = None;
        }
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(_)));
    }

    #[test]
    fn jump_target_must_exist() {
        let node = Node::approval(
            "manager",
            ApprovalNodeConfig::new(
                ApprovalMode::Single,
                ApproverConfig::fixed(vec!["u1".to_string()]),
            )
            .with_reject_jump("nowhere"),
        );
        let template = linear().with_node(node);
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(msg)) if msg.contains("nowhere"));

        let mut template = template;
        if let Some(config) = template
            .nodes
            .get_mut("manager")
            .and_then(|n| match &mut n.config {
                Some(crate::template::NodeConfig::Approval(c)) => Some(c),
                _ => None,
            })
        {
            config.reject_behavior = RejectBehavior::Jump;
            config.reject_target_node = Some("start".to_string());
        }
        assert!(template.validate().is_ok());
    }

    #[test]
    fn webhook_urls_must_be_http() {
        let template = linear().with_config(TemplateConfig {
            webhooks: vec![WebhookConfig {
                url: "ftp://hooks.example.com".to_string(),
                events: vec![],
                headers: Default::default(),
            }],
            auth: None,
        });
        assert_matches!(template.validate(), Err(FlowError::InvalidTemplate(_)));
    }

    #[test]
    fn template_round_trips_through_json() {
        let template = linear();
        let json = serde_json::to_string(&template).unwrap();
        let parsed: Template = serde_json::from_str(&json).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.nodes.len(), 3);
    }
}
