use super::{percent_delta, Comparison, ReportRenderer};
use crate::models::StatField;

const SPLIT_WIDTH: usize = 58;

/// One rendered line: label with previous and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffLine {
    pub label: &'static str,
    pub previous: f64,
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub title: &'static str,
    pub lines: Vec<DiffLine>,
}

/// Text diff in a markdown `diff` fence, grouped by category.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffRenderer;

impl DiffRenderer {
    /// Lines of the diff; operator and compaction lines are the growth
    /// between scale-out and balance.
    pub fn categories(comparison: &Comparison) -> Vec<Category> {
        let value = |field: StatField| comparison.pair(field);
        let grown = |label, prev: StatField, cur: StatField| {
            let (p, c) = (value(prev), value(cur));
            DiffLine {
                label,
                previous: c.previous - p.previous,
                current: c.current - p.current,
            }
        };
        let plain = |label, field: StatField| {
            let pair = value(field);
            DiffLine {
                label,
                previous: pair.previous,
                current: pair.current,
            }
        };

        vec![
            Category {
                title: "balance",
                lines: vec![plain("balance_time", StatField::BalanceInterval)],
            },
            Category {
                title: "schedule",
                lines: vec![
                    grown(
                        "balance_leader_operator_count",
                        StatField::PrevBalanceLeaderCount,
                        StatField::CurBalanceLeaderCount,
                    ),
                    grown(
                        "balance_region_operator_count",
                        StatField::PrevBalanceRegionCount,
                        StatField::CurBalanceRegionCount,
                    ),
                ],
            },
            Category {
                title: "compaction",
                lines: vec![grown(
                    "compaction_flow_bytes",
                    StatField::PrevCompactionRate,
                    StatField::CurCompactionRate,
                )],
            },
            Category {
                title: "apply_log",
                lines: vec![
                    plain("prev_apply_log", StatField::PrevApplyLog),
                    plain("cur_apply_log", StatField::CurApplyLog),
                ],
            },
            Category {
                title: "db_mutex",
                lines: vec![
                    plain("prev_db_mutex", StatField::PrevDbMutex),
                    plain("cur_db_mutex", StatField::CurDbMutex),
                ],
            },
            Category {
                title: "latency",
                lines: vec![
                    plain("prev_query_latency", StatField::PrevLatency),
                    plain("cur_query_latency", StatField::CurLatency),
                ],
            },
        ]
    }
}

fn report_line(line: &DiffLine) -> String {
    format!(
        "\t* {}: {:.2} delta: {:.2}%  \n",
        line.label,
        line.current,
        percent_delta(line.previous, line.current)
    )
}

impl ReportRenderer for DiffRenderer {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn render(&self, comparison: &Comparison) -> String {
        let mut text = String::from("```diff  \n@@\t\t\tBenchmark diff\t\t\t@@\n");
        text.push_str(&"=".repeat(SPLIT_WIDTH));
        text.push('\n');
        for category in Self::categories(comparison) {
            text.push_str(category.title);
            text.push_str(":  \n");
            for line in &category.lines {
                text.push_str(&report_line(line));
            }
        }
        text.push_str("```  \n");
        text
    }
}
