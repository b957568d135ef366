//! Validation rules
//!
//! Rules pair attribute names with a validator closure and the scenarios they
//! apply to. Stores evaluate the rules of the entity's current scenario and
//! report messages per attribute.

pub mod validators;

use crate::core::entity::{Entity, Scenario};
use crate::core::error::FieldErrors;
use std::fmt;
use std::sync::Arc;

/// Boxed validator closure
pub type Validator = Arc<dyn Fn(&str, &serde_json::Value) -> Result<(), String> + Send + Sync>;

/// A validator applied to some attributes in some scenarios
#[derive(Clone)]
pub struct Rule {
    pub attributes: Vec<String>,
    /// Scenarios the rule applies to; empty means all
    pub scenarios: Vec<Scenario>,
    pub validator: Validator,
}

impl Rule {
    pub fn new<I, S, F>(attributes: I, validator: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str, &serde_json::Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            scenarios: Vec::new(),
            validator: Arc::new(validator),
        }
    }

    /// Restrict the rule to one scenario
    pub fn on(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn applies_to(&self, scenario: Scenario) -> bool {
        self.scenarios.is_empty() || self.scenarios.contains(&scenario)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("attributes", &self.attributes)
            .field("scenarios", &self.scenarios)
            .finish()
    }
}

/// Run every rule of the entity's scenario, collecting messages per attribute
pub fn run_rules(rules: &[Rule], entity: &dyn Entity) -> FieldErrors {
    let scenario = entity.scenario();
    let mut errors = FieldErrors::new();

    for rule in rules.iter().filter(|r| r.applies_to(scenario)) {
        for attribute in &rule.attributes {
            let value = entity.get(attribute).unwrap_or_default().to_json();
            if let Err(message) = (rule.validator)(attribute, &value) {
                errors.entry(attribute.clone()).or_default().push(message);
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Record;
    use crate::core::field::FieldValue;

    fn user(scenario: Scenario) -> Record {
        let names = vec!["id".to_string(), "name".to_string(), "email".to_string()];
        let mut record = Record::new("user", &names);
        record.set_scenario(scenario);
        record
    }

    #[test]
    fn test_run_rules_collects_per_attribute() {
        let rules = vec![
            Rule::new(["name", "email"], validators::required()),
            Rule::new(["email"], validators::email()),
        ];
        let mut record = user(Scenario::Create);
        record.set("email", FieldValue::from("nope"));

        let errors = run_rules(&rules, &record);
        assert_eq!(errors["name"], vec!["Name cannot be blank."]);
        assert_eq!(errors["email"], vec!["Email is not a valid email address."]);
    }

    #[test]
    fn test_rules_are_scoped_to_scenarios() {
        let rules = vec![Rule::new(["name"], validators::required()).on(Scenario::Create)];
        assert!(!run_rules(&rules, &user(Scenario::Create)).is_empty());
        assert!(run_rules(&rules, &user(Scenario::Update)).is_empty());
    }
}
