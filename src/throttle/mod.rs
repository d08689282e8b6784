//! Ordered, table-driven throttling rule engine.
//!
//! Rules are evaluated in order; each yields ACCEPT/DEFER/REJECT/FAKEACCEPT
//! or a probabilistic split, and the first terminal result wins (spec.md
//! §4.3). Per the REDESIGN FLAG in spec.md §9, rule conditions are a closed
//! tagged-variant enum instead of closures over a raw map — grounded on the
//! shape of `original_source/antenna/throttler.py`'s `Rule`/`Throttler`, but
//! turned from callables into data so the default rule set (`rules.rs`) is
//! portable.

pub mod rules;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Terminal throttle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Defer,
    Reject,
    FakeAccept,
}

impl Decision {
    pub fn as_text(&self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Defer => "DEFER",
            Decision::Reject => "REJECT",
            Decision::FakeAccept => "FAKEACCEPT",
        }
    }

    /// The digit embedded in a freshly-minted crash id (spec.md §4.1,
    /// `original_source/antenna/util.py::create_crash_id`'s `throttle_result`
    /// argument, which is the decision's raw ordinal, not clamped to 0/1).
    pub fn as_throttle_digit(&self) -> u8 {
        match self {
            Decision::Accept => 0,
            Decision::Defer => 1,
            Decision::Reject => 2,
            Decision::FakeAccept => 3,
        }
    }
}

/// What a rule produces once its condition matches.
#[derive(Debug, Clone)]
pub enum Outcome {
    Terminal(Decision),
    /// `(percentage, at-or-under, above)`: draw `r` uniformly in `[0, 100)`;
    /// if `r <= percentage` pick `le`, else pick `gt`. Either arm may be
    /// `Continue` to fall through to the next rule.
    Split {
        percentage: u8,
        le: SplitArm,
        gt: SplitArm,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum SplitArm {
    Decision(Decision),
    Continue,
}

/// A rule condition, modeled as data rather than a closure (spec.md §9).
#[derive(Debug, Clone)]
pub enum Condition {
    Always,
    /// `key == value`, evaluated against a specific annotation.
    KeyEquals { key: &'static str, value: &'static str },
    /// `key` present, evaluated against a specific annotation (value ignored).
    KeyPresent { key: &'static str },
    /// `key` starts with one of the given prefixes.
    KeyStartsWithAny {
        key: &'static str,
        prefixes: &'static [&'static str],
    },
    /// `key` is one of the given exact values.
    KeyInSet {
        key: &'static str,
        values: &'static [&'static str],
    },
    /// Rule-specific predicates that need more than a single key/value check
    /// (spec.md §4.3 rules 1-5, 12).
    OldBuildId,
    HangIdAndBrowser,
    InfobarIsTrue,
    B2g,
    UnsupportedProduct,
    FirefoxRelease,
}

/// A single immutable throttling rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    /// `"*"` for whole-map conditions, or a specific annotation key.
    pub key: &'static str,
    pub condition: Condition,
    pub outcome: Outcome,
}

impl Rule {
    /// Construct a rule, validating the name per spec.md §3.
    pub fn new(name: &'static str, key: &'static str, condition: Condition, outcome: Outcome) -> Self {
        assert!(
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "rule name {name:?} must match ^[A-Za-z0-9_]+$",
        );
        Self {
            name,
            key,
            condition,
            outcome,
        }
    }
}

/// Result of evaluating the throttler: `(decision, rule name, percentage)`.
pub type ThrottleResult = (Decision, String, u8);

/// An ordered, immutable rule set plus a product allow-list.
pub struct Throttler {
    rules: Vec<Rule>,
    products: Vec<&'static str>,
}

impl Throttler {
    pub fn new(rules: Vec<Rule>, products: Vec<&'static str>) -> Self {
        Self { rules, products }
    }

    pub fn mozilla() -> Self {
        Self::new(rules::mozilla_rules(), rules::MOZILLA_PRODUCTS.to_vec())
    }

    pub fn products(&self) -> &[&'static str] {
        &self.products
    }

    /// Evaluate the rule set against the annotation map.
    pub fn throttle(&self, annotations: &HashMap<String, String>) -> ThrottleResult {
        self.throttle_at(annotations, Utc::now(), &mut rand::thread_rng())
    }

    /// Evaluate with an injectable RNG, for deterministic tests.
    pub fn throttle_with_rng(
        &self,
        annotations: &HashMap<String, String>,
        rng: &mut impl Rng,
    ) -> ThrottleResult {
        self.throttle_at(annotations, Utc::now(), rng)
    }

    /// Evaluate with an injectable RNG and reference clock, for fully
    /// deterministic tests of the `has_old_buildid` rule.
    pub fn throttle_at(
        &self,
        annotations: &HashMap<String, String>,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> ThrottleResult {
        for rule in &self.rules {
            let matched = self.evaluate_condition(&rule.condition, rule.key, annotations, now);
            if !matched {
                continue;
            }

            match &rule.outcome {
                Outcome::Terminal(decision) => {
                    return (*decision, rule.name.to_string(), 100);
                }
                Outcome::Split { percentage, le, gt } => {
                    let roll = rng.gen_range(0..100u8);
                    let arm = if roll <= *percentage { le } else { gt };
                    match arm {
                        SplitArm::Decision(decision) => {
                            return (*decision, rule.name.to_string(), *percentage);
                        }
                        SplitArm::Continue => continue,
                    }
                }
            }
        }

        (Decision::Reject, "NO_MATCH".to_string(), 0)
    }

    fn evaluate_condition(
        &self,
        condition: &Condition,
        key: &'static str,
        annotations: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> bool {
        // `*`/whole-map conditions see the whole map; single-key conditions
        // skip if the key is missing (spec.md §4.3).
        let is_whole_map = key == "*"
            || matches!(
                condition,
                Condition::OldBuildId
                    | Condition::HangIdAndBrowser
                    | Condition::InfobarIsTrue
                    | Condition::B2g
                    | Condition::UnsupportedProduct
                    | Condition::FirefoxRelease
            );

        if !is_whole_map {
            let Some(value) = annotations.get(key) else {
                return false;
            };
            return self.evaluate_value_condition(condition, value);
        }

        match condition {
            Condition::Always => true,
            Condition::OldBuildId => rules::has_old_buildid(annotations, now),
            Condition::HangIdAndBrowser => rules::has_hangid_and_browser(annotations),
            Condition::InfobarIsTrue => rules::infobar_is_true(annotations),
            Condition::B2g => rules::is_b2g(annotations, &self.products),
            Condition::UnsupportedProduct => {
                rules::is_unsupported_product(annotations, &self.products)
            }
            Condition::FirefoxRelease => rules::is_firefox_release(annotations),
            _ => false,
        }
    }

    fn evaluate_value_condition(&self, condition: &Condition, value: &str) -> bool {
        match condition {
            Condition::KeyEquals { value: expected, .. } => value == *expected,
            Condition::KeyPresent { .. } => true,
            Condition::KeyStartsWithAny { prefixes, .. } => {
                prefixes.iter().any(|p| value.starts_with(p))
            }
            Condition::KeyInSet { values, .. } => values.contains(&value),
            _ => false,
        }
    }
}
