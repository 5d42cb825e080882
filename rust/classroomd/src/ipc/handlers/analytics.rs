use chrono::{Local, NaiveDate};
use serde_json::{json, Value};

use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_date, get_required_str, require_store, respond};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{dashboard, letter_distribution, student_metrics, DashboardInput};
use crate::model::{AttendanceRecord, Class, CurriculumActivity, GradeRecord, Student};
use crate::repo::Repository;
use crate::store::Query;

fn today_or(params: &Value) -> Result<NaiveDate, HandlerErr> {
    Ok(get_optional_date(params, "today")?.unwrap_or_else(|| Local::now().date_naive()))
}

fn analytics_dashboard(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let today = today_or(params)?;
    let all = Query::all();
    let students = Repository::<Student>::new(store).list(&all)?;
    let classes = Repository::<Class>::new(store).list(&all)?;
    let attendance = Repository::<AttendanceRecord>::new(store).list(&all)?;
    let grades = Repository::<GradeRecord>::new(store).list(&all)?;
    let activity_count = Repository::<CurriculumActivity>::new(store).list(&all)?.len();

    let input = DashboardInput {
        students: &students,
        classes: &classes,
        attendance: &attendance,
        grades: &grades,
        activity_count,
    };
    let distribution: serde_json::Map<String, Value> = letter_distribution(&grades)
        .into_iter()
        .map(|(letter, n)| (letter.to_string(), json!(n)))
        .collect();
    Ok(json!({
        "today": today,
        "dashboard": dashboard(&input, today),
        "letterDistribution": distribution,
    }))
}

fn analytics_student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = require_store(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let student = Repository::<Student>::new(store).get(&student_id)?;
    let by_student = Query::all().where_eq("studentId", student_id.as_str());
    let attendance = Repository::<AttendanceRecord>::new(store).list(&by_student)?;
    let grades = Repository::<GradeRecord>::new(store).list(&by_student)?;
    Ok(json!({
        "student": { "id": &student.id, "displayName": student.display_name() },
        "metrics": student_metrics(&student_id, &attendance, &grades),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "analytics.dashboard" => analytics_dashboard(state, &req.params),
        "analytics.student" => analytics_student(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
