use serde_json::Value;

use crate::models::report::{Report, Task};

const REPORTS_HEADER: &str = "ID,Date,Hall,Responsable,Effectif,Début,Fin,Taux,\
Tâches Planifiées,Tâches Réalisées,Total Tâches,Photos,Created At";

const TASKS_HEADER: &str =
    "Hall,Lieu,Désignation,Planifié,Statut,Photo avant,Photo après,Commentaire";

// Every value is wrapped in double quotes with embedded quotes doubled.
// Newlines and commas inside values are not normalized beyond the wrapping.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn quote_opt(value: Option<&str>) -> String {
    quote(value.unwrap_or(""))
}

fn quote_count(value: Option<u64>) -> String {
    quote(&value.unwrap_or(0).to_string())
}

// staffCount is whatever JSON the client sent; render scalars bare and
// anything else through its JSON text.
fn staff_count_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// One row per report, in store order.
pub fn all_reports_csv(reports: &[Report]) -> String {
    let mut csv = String::from(REPORTS_HEADER);
    csv.push('\n');

    for report in reports {
        let row = [
            quote(&report.id.to_string()),
            quote_opt(report.form_data.date.as_deref()),
            quote_opt(report.form_data.hall.as_deref()),
            quote_opt(report.form_data.responsible.as_deref()),
            quote(&staff_count_text(report.form_data.staff_count.as_ref())),
            quote_opt(report.form_data.start_time.as_deref()),
            quote_opt(report.form_data.end_time.as_deref()),
            quote(report.stats.planning_rate.as_deref().unwrap_or("0%")),
            quote_count(report.stats.tasks_planned),
            quote_count(report.stats.tasks_done),
            quote_count(report.stats.total_tasks),
            quote(&report.files_count.to_string()),
            quote(&report.created_at.to_rfc3339()),
        ]
        .join(",");
        csv.push_str(&row);
        csv.push('\n');
    }

    csv
}

/// One row per checklist task of a single report.
pub fn report_tasks_csv(report: &Report) -> String {
    let mut csv = String::from(TASKS_HEADER);
    csv.push('\n');

    for task in &report.checklist_data {
        csv.push_str(&task_row(task));
        csv.push('\n');
    }

    csv
}

fn task_row(task: &Task) -> String {
    [
        quote_opt(task.hall.as_deref()),
        quote_opt(task.circuit.as_deref()),
        quote_opt(task.designation.as_deref()),
        quote_opt(task.planned.as_deref()),
        quote(task.status.as_deref().unwrap_or("Non défini")),
        quote(task.photo_before.as_deref().unwrap_or("Non")),
        quote(task.photo_after.as_deref().unwrap_or("Non")),
        quote_opt(task.comment.as_deref()),
    ]
    .join(",")
}
