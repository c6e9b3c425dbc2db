//! Weight arithmetic and palettes. All functions are pure.

use crate::rubric::{AttributeCategory, RubricAttribute};

pub const MIN_KSA_WEIGHT: f64 = 10.0;
pub const MAX_KSA_WEIGHT: f64 = 25.0;
pub const NORMALIZATION_TOLERANCE: f64 = 0.5;

const VALUE_WEIGHT_PER_ITEM: f64 = 4.0;
const MIN_VALUE_WEIGHT_TOTAL: f64 = 15.0;
const MAX_VALUE_WEIGHT_TOTAL: f64 = 25.0;

pub const VALUE_COLORS: [&str; 8] = [
    "#E11D48", "#7C3AED", "#0891B2", "#059669", "#D97706", "#DB2777", "#4F46E5", "#65A30D",
];

pub const VALUE_ICONS: [&str; 8] = [
    "heart", "shield", "compass", "users", "zap", "star", "target", "leaf",
];

/// `(icon, color)` for a VALUE attribute at `index`.
pub fn value_style(index: usize) -> (&'static str, &'static str) {
    (
        VALUE_ICONS[index % VALUE_ICONS.len()],
        VALUE_COLORS[index % VALUE_COLORS.len()],
    )
}

/// `(icon, color)` for model-produced categories.
pub fn category_style(category: AttributeCategory) -> (&'static str, &'static str) {
    match category {
        AttributeCategory::Knowledge => ("book-open", "#2563EB"),
        AttributeCategory::Skill => ("wrench", "#16A34A"),
        AttributeCategory::Ability => ("brain", "#EA580C"),
        AttributeCategory::Value => value_style(0),
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn clamp_ksa_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.clamp(MIN_KSA_WEIGHT, MAX_KSA_WEIGHT)
    } else {
        MIN_KSA_WEIGHT
    }
}

/// Share of the rubric reserved for culture values: 4 per value, held to 15..=25.
pub fn value_weight_total(count: usize) -> f64 {
    (count as f64 * VALUE_WEIGHT_PER_ITEM).clamp(MIN_VALUE_WEIGHT_TOTAL, MAX_VALUE_WEIGHT_TOTAL)
}

pub fn weight_per_value(count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round1(value_weight_total(count) / count as f64)
}

pub fn total_weight(attributes: &[RubricAttribute]) -> f64 {
    attributes.iter().map(|a| a.weight).sum()
}

/// Scales `attributes` so they sum to `target`, rounding each to one decimal.
pub fn rescale(attributes: &mut [RubricAttribute], target: f64) {
    let current = total_weight(attributes);
    if attributes.is_empty() {
        return;
    }
    if current <= 0.0 {
        let even = round1(target / attributes.len() as f64);
        attributes.iter_mut().for_each(|a| a.weight = even);
        return;
    }
    let factor = target / current;
    for attribute in attributes.iter_mut() {
        attribute.weight = round1(attribute.weight * factor);
    }
}

/// Brings the total back to 100 when it drifts past the tolerance. Returns
/// whether anything changed.
///
/// Rounding can leave a long list outside the tolerance even after scaling;
/// the residual is then moved onto the heaviest attribute.
pub fn normalize(attributes: &mut [RubricAttribute]) -> bool {
    let total = total_weight(attributes);
    if attributes.is_empty() || (total - 100.0).abs() <= NORMALIZATION_TOLERANCE {
        return false;
    }
    rescale(attributes, 100.0);

    let residual = round1(100.0 - total_weight(attributes));
    if residual.abs() > NORMALIZATION_TOLERANCE {
        if let Some(heaviest) = attributes
            .iter_mut()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
        {
            heaviest.weight = round1(heaviest.weight + residual);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn attribute(weight: f64) -> RubricAttribute {
        RubricAttribute {
            id: Uuid::new_v4(),
            name: "x".into(),
            description: String::new(),
            category: AttributeCategory::Skill,
            icon: "wrench".into(),
            color: "#16A34A".into(),
            weight,
            sub_attributes: vec![],
        }
    }

    #[test]
    fn test_value_weight_total_is_clamped() {
        assert_eq!(value_weight_total(1), 15.0);
        assert_eq!(value_weight_total(2), 15.0);
        assert_eq!(value_weight_total(5), 20.0);
        assert_eq!(value_weight_total(9), 25.0);
        assert_eq!(weight_per_value(2), 7.5);
        assert_eq!(weight_per_value(3), 5.0);
        assert_eq!(weight_per_value(0), 0.0);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(21.249), 21.2);
        assert_eq!(round1(21.25), 21.3);
        assert_eq!(round1(7.5), 7.5);
    }

    #[test]
    fn test_rescale_hits_target() {
        let mut attrs: Vec<_> = [20.0, 15.0, 25.0, 10.0].into_iter().map(attribute).collect();
        rescale(&mut attrs, 85.0);
        assert!((total_weight(&attrs) - 85.0).abs() <= 0.2);
    }

    #[test]
    fn test_normalize_leaves_close_totals_alone() {
        let mut attrs: Vec<_> = [50.0, 50.3].into_iter().map(attribute).collect();
        assert!(!normalize(&mut attrs));
        assert_eq!(attrs[1].weight, 50.3);
    }

    #[test]
    fn test_normalize_many_small_attributes_stays_in_tolerance() {
        let mut attrs: Vec<_> = (0..23).map(|_| attribute(13.0)).collect();
        assert!(normalize(&mut attrs));
        let total = total_weight(&attrs);
        assert!((99.5..=100.5).contains(&total), "total {total}");
    }

    #[test]
    fn test_value_styles_are_unique_within_a_cycle() {
        let styles: std::collections::HashSet<_> = (0..8).map(value_style).collect();
        assert_eq!(styles.len(), 8);
        assert_eq!(value_style(8), value_style(0));
    }

    #[test]
    fn test_clamp_ksa_weight() {
        assert_eq!(clamp_ksa_weight(3.0), 10.0);
        assert_eq!(clamp_ksa_weight(40.0), 25.0);
        assert_eq!(clamp_ksa_weight(f64::NAN), 10.0);
    }
}
