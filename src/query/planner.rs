//! # Planner
//!
//! Chooses a scan strategy for a select. The WHERE shape yields the
//! candidate plans; when statistics are valid each candidate is scored and
//! the cheapest wins, ties breaking toward the earlier candidate. Without
//! statistics a fixed-cost fallback applies.

use super::expr::{CompareOp, WhereExpr};
use crate::storage::stats::TableStatistics;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plan {
    /// Iterate every row from the start cursor.
    FullScan,
    /// Probe the primary key for a single row.
    IndexLookup { key: u32 },
    /// Seek to `start_key` and follow the leaf chain. `forward` is always
    /// true today; backward scans are a reserved extension.
    RangeScan { start_key: u32, forward: bool },
}

/// Predicate-evaluation overhead per row of a full scan.
const FULL_SCAN_ROW_COST: f64 = 1.1;

pub fn plan_select(where_clause: Option<&WhereExpr>, stats: &TableStatistics) -> Plan {
    let expr = match where_clause {
        None => return Plan::FullScan,
        Some(expr) => expr,
    };

    let mut best: Option<(Plan, f64)> = None;
    for plan in candidate_plans(expr) {
        let cost = if stats.is_valid {
            estimated_cost(&plan, expr, stats)
        } else {
            fallback_cost(&plan)
        };
        trace!(?plan, cost, "Scored candidate plan");
        match &best {
            Some((_, best_cost)) if cost >= *best_cost => {}
            _ => best = Some((plan, cost)),
        }
    }
    best.map(|(plan, _)| plan).unwrap_or(Plan::FullScan)
}

/// Candidate plans in preference order: an equality probe on the key, a
/// range seek from a lower bound, and always the full scan.
fn candidate_plans(expr: &WhereExpr) -> Vec<Plan> {
    let mut plans = Vec::new();
    let conjuncts = expr.conjuncts();

    for conjunct in &conjuncts {
        if let Some((CompareOp::Eq, key)) = conjunct.as_id_compare() {
            plans.push(Plan::IndexLookup { key });
            break;
        }
    }
    for conjunct in &conjuncts {
        match conjunct.as_id_compare() {
            Some((CompareOp::Gt, key)) => {
                plans.push(Plan::RangeScan {
                    start_key: key.saturating_add(1),
                    forward: true,
                });
                break;
            }
            Some((CompareOp::Ge, key)) => {
                plans.push(Plan::RangeScan {
                    start_key: key,
                    forward: true,
                });
                break;
            }
            _ => {}
        }
    }
    // A lone upper bound on the key still scans forward from the start; the
    // WHERE filter bounds the range, not the scan.
    if plans.is_empty() && conjuncts.len() == 1 {
        if let Some((CompareOp::Lt | CompareOp::Le, _)) = conjuncts[0].as_id_compare() {
            plans.push(Plan::RangeScan {
                start_key: 0,
                forward: true,
            });
        }
    }
    plans.push(Plan::FullScan);
    plans
}

fn fallback_cost(plan: &Plan) -> f64 {
    match plan {
        Plan::IndexLookup { .. } => 1.0,
        Plan::RangeScan { .. } => 10.0,
        Plan::FullScan => 100.0,
    }
}

fn estimated_cost(plan: &Plan, expr: &WhereExpr, stats: &TableStatistics) -> f64 {
    let total = stats.total_rows.max(1) as f64;
    match plan {
        Plan::IndexLookup { .. } => total.log2() + 1.0,
        Plan::RangeScan { .. } => total.log2() + selectivity(expr, stats) * total,
        Plan::FullScan => total * FULL_SCAN_ROW_COST,
    }
}

/// Estimated fraction of rows a predicate keeps.
fn selectivity(expr: &WhereExpr, stats: &TableStatistics) -> f64 {
    match expr {
        WhereExpr::Basic { .. } => basic_selectivity(expr, stats),
        // Compound predicates default to 10%.
        _ => 0.1,
    }
}

fn basic_selectivity(expr: &WhereExpr, stats: &TableStatistics) -> f64 {
    use super::expr::{Field, Value};
    let WhereExpr::Basic { field, op, value } = expr else {
        return 1.0;
    };
    match op {
        CompareOp::Eq => {
            let cardinality = match field {
                Field::Id => stats.id_cardinality,
                Field::Username => stats.username_cardinality,
                Field::Email => stats.email_cardinality,
            };
            1.0 / cardinality.max(1) as f64
        }
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            if let (Field::Id, Value::Int(bound)) = (field, value) {
                id_range_fraction(*op, *bound, stats)
            } else {
                1.0
            }
        }
        CompareOp::Ne => 1.0,
    }
}

/// Fraction of the `[id_min, id_max]` interval a range predicate covers.
fn id_range_fraction(op: CompareOp, bound: u32, stats: &TableStatistics) -> f64 {
    let min = stats.id_min as f64;
    let max = stats.id_max as f64;
    let span = max - min + 1.0;
    let bound = bound as f64;
    let covered = match op {
        CompareOp::Gt => max - bound,
        CompareOp::Ge => max - bound + 1.0,
        CompareOp::Lt => bound - min,
        CompareOp::Le => bound - min + 1.0,
        _ => span,
    };
    (covered / span).clamp(0.0, 1.0)
}
