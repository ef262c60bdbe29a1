//! Declarative descriptors for the contractual built-in tools.
//!
//! This module only describes the tools' names and schemas; the
//! implementations that actually dispatch to the grounding layer and
//! the downstream adapters are registered by `harvey-loop`, which sits
//! above both this crate and the adapters in the dependency order.

use harvey_types::{ParamSchema, SideEffect, ToolDescriptor};

fn filters_schema() -> Vec<ParamSchema> {
    vec![
        ParamSchema::required("minPrice", "number")
            .optional()
            .with_bounds(Some(0.0), None),
        ParamSchema::required("maxPrice", "number")
            .optional()
            .with_bounds(Some(0.0), None),
        ParamSchema::required("features", "array").optional(),
        ParamSchema::required("usageLimits", "array")
            .optional()
            .with_nested(vec![ParamSchema::required("*", "number-map")]),
    ]
}

/// `iPricing(url) -> { yaml, canonicalUrl }`
pub fn i_pricing_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "iPricing".into(),
        description: "Resolve a pricing page URL into its canonical YAML specification.".into(),
        input_schema: vec![ParamSchema::required("url", "string")],
        output_schema: vec![
            ParamSchema::required("yaml", "string"),
            ParamSchema::required("canonicalUrl", "string"),
        ],
        side_effect: SideEffect::Network,
    }
}

/// `summary(yaml) -> { counts and statistics }`
pub fn summary_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "summary".into(),
        description: "Summarize a pricing YAML's plans, features and usage limits.".into(),
        input_schema: vec![ParamSchema::required("yaml", "string")],
        output_schema: vec![],
        side_effect: SideEffect::Network,
    }
}

/// `subscriptions(yaml, filters?) -> { configurations, cardinality }`
pub fn subscriptions_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "subscriptions".into(),
        description: "List valid subscription configurations matching optional filters.".into(),
        input_schema: vec![
            ParamSchema::required("yaml", "string"),
            ParamSchema::required("filters", "object")
                .optional()
                .with_nested(filters_schema()),
        ],
        output_schema: vec![],
        side_effect: SideEffect::Network,
    }
}

/// `optimal(yaml, filters, objective) -> { configuration, cost }`
pub fn optimal_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "optimal".into(),
        description: "Find the optimal subscription configuration under filters and an objective.".into(),
        input_schema: vec![
            ParamSchema::required("yaml", "string"),
            ParamSchema::required("filters", "object").with_nested(filters_schema()),
            ParamSchema::required("objective", "string").with_enum(["minimize", "maximize"]),
        ],
        output_schema: vec![],
        side_effect: SideEffect::Network,
    }
}

/// `validate(yaml, solver?) -> { valid, errors? }`
pub fn validate_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "validate".into(),
        description: "Validate a pricing YAML document against the solver.".into(),
        input_schema: vec![
            ParamSchema::required("yaml", "string"),
            ParamSchema::required("solver", "string").optional(),
        ],
        output_schema: vec![
            ParamSchema::required("valid", "boolean"),
            ParamSchema::required("errors", "array").optional(),
        ],
        side_effect: SideEffect::Network,
    }
}

/// `filter(yaml, filters) -> { filtered configuration space }`
pub fn filter_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "filter".into(),
        description: "Restrict a pricing YAML's configuration space to those matching filters.".into(),
        input_schema: vec![
            ParamSchema::required("yaml", "string"),
            ParamSchema::required("filters", "object").with_nested(filters_schema()),
        ],
        output_schema: vec![],
        side_effect: SideEffect::Network,
    }
}

/// All six contractual built-in descriptors, in the order this crate lists
/// them.
pub fn all() -> Vec<ToolDescriptor> {
    vec![
        i_pricing_descriptor(),
        summary_descriptor(),
        subscriptions_descriptor(),
        optimal_descriptor(),
        validate_descriptor(),
        filter_descriptor(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_names_are_contractual() {
        let names: Vec<String> = all().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["iPricing", "summary", "subscriptions", "optimal", "validate", "filter"]
        );
    }
}
