//! Productivity aggregation over committed work logs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{TaskKind, WorkLogRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_kind: TaskKind,
    pub records: usize,
    pub quantity: u64,
    pub labor_hours: f64,
    /// Pooled LPH (quantity over labor-hours). `None` when no hours were logged.
    pub lph: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductivitySummary {
    pub records: usize,
    pub total_quantity: u64,
    pub total_labor_hours: f64,
    /// Mean of per-record LPH, over records with positive hours only.
    pub mean_lph: Option<f64>,
    pub by_task: Vec<TaskSummary>,
}

pub fn summarize(records: &[WorkLogRecord]) -> ProductivitySummary {
    let mut by_task: BTreeMap<TaskKind, TaskSummary> = BTreeMap::new();
    let mut lph_sum = 0.0;
    let mut lph_count = 0usize;

    for record in records {
        if let Some(lph) = record.lph() {
            lph_sum += lph;
            lph_count += 1;
        }
        let entry = by_task.entry(record.task_kind).or_insert_with(|| TaskSummary {
            task_kind: record.task_kind,
            records: 0,
            quantity: 0,
            labor_hours: 0.0,
            lph: None,
        });
        entry.records += 1;
        entry.quantity += record.quantity;
        entry.labor_hours += record.duration_hours;
    }

    let by_task: Vec<TaskSummary> = by_task
        .into_values()
        .map(|mut t| {
            t.lph = pooled_lph(t.quantity, t.labor_hours);
            t
        })
        .collect();

    ProductivitySummary {
        records: records.len(),
        total_quantity: records.iter().map(|r| r.quantity).sum(),
        total_labor_hours: records.iter().map(|r| r.duration_hours).sum(),
        mean_lph: (lph_count > 0).then(|| lph_sum / lph_count as f64),
        by_task,
    }
}

fn pooled_lph(quantity: u64, hours: f64) -> Option<f64> {
    (hours > 0.0).then(|| quantity as f64 / hours)
}
