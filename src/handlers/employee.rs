//! Employee handlers
//!
//! CRUD over employee personal details. Deletes are soft: `deleted_at` is set and
//! every read path filters on `deleted_at IS NULL`.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, Func, LikeExpr, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::entity::activity_log::{OpResult, OpType};
use crate::entity::department_history::{self, Assignment};
use crate::entity::{employee, now_ts};
use crate::error::{AppError, AppResult, OptionExt};
use crate::extract::{ApiPath, ApiQuery, ValidatedJson};
use crate::handlers::activity::service::log_operation;
use crate::handlers::ensure_changes;
use crate::middleware::CurrentUser;
use crate::permission::require_admin;
use crate::routes::{ApiResponse, Page, PageQuery};
use crate::state::AppState;

/// Initial department assignment, starting on the hire date
#[derive(Debug, Deserialize, Validate)]
pub struct InitialAssignment {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub department: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub designation: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub salary: f64,
}

/// Create employee request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmployeeRequest {
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub employee_code: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 16, message = "must be at most 16 characters"))]
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub hire_date: NaiveDate,
    #[validate(nested)]
    pub department: Option<InitialAssignment>,
}

/// Partial employee update; only provided fields are written
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateEmployeeRequest {
    #[validate(length(min = 1, max = 32, message = "must be 1 to 32 characters"))]
    pub employee_code: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 32, message = "must be at most 32 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 16, message = "must be at most 16 characters"))]
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub hire_date: Option<NaiveDate>,
}

/// Employee with the current department assignment
#[derive(Debug, Serialize)]
pub struct EmployeeResponse {
    #[serde(flatten)]
    pub employee: employee::Model,
    pub current: Option<Assignment>,
}

/// GET /api/employees query parameters
#[derive(Debug, Default, Deserialize)]
pub struct EmployeeListQuery {
    pub search: Option<String>,
    pub department: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl EmployeeListQuery {
    fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// Non-deleted employees only
pub fn live_employees() -> Select<employee::Entity> {
    employee::Entity::find().filter(employee::Column::DeletedAt.is_null())
}

/// `SELECT id FROM ept_employee WHERE deleted_at IS NULL`, for scoping child records
pub fn live_employee_ids() -> SelectStatement {
    live_employees()
        .select_only()
        .column(employee::Column::Id)
        .into_query()
}

/// Load a non-deleted employee or 404
pub async fn find_live_employee<C: ConnectionTrait>(db: &C, id: i64) -> AppResult<employee::Model> {
    live_employees()
        .filter(employee::Column::Id.eq(id))
        .one(db)
        .await?
        .ok_or_not_found(format!("employee {} not found", id))
}

/// Case-insensitive substring match over name, email and code
const LIKE_ESCAPE: char = '\\';

/// `%term%` with the term's own wildcards matched literally
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn search_condition(term: &str) -> Condition {
    let pattern = like_pattern(term);
    [
        employee::Column::FirstName,
        employee::Column::LastName,
        employee::Column::Email,
        employee::Column::EmployeeCode,
    ]
    .into_iter()
    .fold(Condition::any(), |cond, column| {
        cond.add(
            Expr::expr(Func::lower(Expr::col(column)))
                .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
        )
    })
}

/// Active assignments keyed by employee id
pub async fn current_assignments<C: ConnectionTrait>(
    db: &C,
    employee_ids: Vec<i64>,
) -> AppResult<HashMap<i64, Assignment>> {
    if employee_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = department_history::Entity::find()
        .filter(department_history::Column::EmployeeId.is_in(employee_ids))
        .filter(department_history::Column::IsActive.eq(true))
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.employee_id, Assignment::from(row)))
        .collect())
}

/// Make sure no other employee (deleted ones included) holds the email or code
async fn ensure_unique<C: ConnectionTrait>(
    db: &C,
    email: Option<&str>,
    code: Option<&str>,
    exclude_id: Option<i64>,
) -> AppResult<()> {
    if email.is_none() && code.is_none() {
        return Ok(());
    }

    let mut cond = Condition::any();
    if let Some(email) = email {
        cond = cond.add(employee::Column::Email.eq(email));
    }
    if let Some(code) = code {
        cond = cond.add(employee::Column::EmployeeCode.eq(code));
    }

    let mut select = employee::Entity::find().filter(cond);
    if let Some(id) = exclude_id {
        select = select.filter(employee::Column::Id.ne(id));
    }

    if let Some(clash) = select.one(db).await? {
        let field = if email == Some(clash.email.as_str()) {
            "email"
        } else {
            "employee_code"
        };
        return Err(AppError::Conflict(format!("{} already in use", field)));
    }
    Ok(())
}

/// GET /api/employees
pub async fn list_employees(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<EmployeeListQuery>,
) -> AppResult<Json<ApiResponse<Page<EmployeeResponse>>>> {
    let paging = query.paging();
    let (page, page_size) = paging.resolve();

    let mut select = live_employees();
    if let Some(term) = query.search_term() {
        select = select.filter(search_condition(&term));
    }
    if let Some(department) = query.department.as_deref().filter(|d| !d.is_empty()) {
        let ids: Vec<i64> = department_history::Entity::find()
            .select_only()
            .column(department_history::Column::EmployeeId)
            .filter(department_history::Column::IsActive.eq(true))
            .filter(department_history::Column::Department.eq(department))
            .into_tuple()
            .all(&*state.db)
            .await?;
        select = select.filter(employee::Column::Id.is_in(ids));
    }

    let total = select.clone().count(&*state.db).await?;
    let employees = select
        .order_by_asc(employee::Column::Id)
        .offset(paging.offset())
        .limit(page_size)
        .all(&*state.db)
        .await?;

    let mut assignments =
        current_assignments(&*state.db, employees.iter().map(|e| e.id).collect()).await?;
    let items = employees
        .into_iter()
        .map(|employee| EmployeeResponse {
            current: assignments.remove(&employee.id),
            employee,
        })
        .collect();

    Ok(Json(ApiResponse::success(Page {
        items,
        total,
        page,
        page_size,
    })))
}

/// GET /api/employees/:id
pub async fn get_employee(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<EmployeeResponse>>> {
    let employee = find_live_employee(&*state.db, id).await?;
    let current = current_assignments(&*state.db, vec![id]).await?.remove(&id);
    Ok(Json(ApiResponse::success(EmployeeResponse { employee, current })))
}

/// POST /api/employees
pub async fn create_employee(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(req): ValidatedJson<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EmployeeResponse>>)> {
    let txn = state.db.begin().await?;

    ensure_unique(&txn, Some(&req.email), Some(&req.employee_code), None).await?;

    let now = now_ts();
    let employee = employee::ActiveModel {
        employee_code: Set(req.employee_code),
        first_name: Set(req.first_name),
        last_name: Set(req.last_name),
        email: Set(req.email),
        phone: Set(req.phone),
        gender: Set(req.gender),
        date_of_birth: Set(req.date_of_birth),
        address: Set(req.address),
        hire_date: Set(req.hire_date),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let current = match req.department {
        Some(initial) => {
            let row = department_history::ActiveModel {
                employee_id: Set(employee.id),
                department: Set(initial.department),
                designation: Set(initial.designation),
                salary: Set(initial.salary),
                start_date: Set(employee.hire_date),
                end_date: Set(None),
                is_active: Set(true),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            Some(Assignment::from(row))
        }
        None => None,
    };

    txn.commit().await?;

    log_operation(
        &current_user.username,
        OpType::CreateEmployee,
        format!("{} ({})", employee.full_name(), employee.employee_code),
        OpResult::Success,
    );

    Ok(ApiResponse::created(EmployeeResponse { employee, current }))
}

/// PATCH /api/employees/:id
pub async fn update_employee(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateEmployeeRequest>,
) -> AppResult<Json<ApiResponse<EmployeeResponse>>> {
    let existing = find_live_employee(&*state.db, id).await?;

    let new_email = req.email.as_deref().filter(|e| *e != existing.email);
    let new_code = req
        .employee_code
        .as_deref()
        .filter(|c| *c != existing.employee_code);
    ensure_unique(&*state.db, new_email, new_code, Some(id)).await?;

    let mut active: employee::ActiveModel = existing.into();
    let changed = apply_update(&mut active, req);
    ensure_changes(changed)?;
    active.updated_at = Set(now_ts());

    let employee = active.update(&*state.db).await?;
    let current = current_assignments(&*state.db, vec![id]).await?.remove(&id);

    log_operation(
        &current_user.username,
        OpType::UpdateEmployee,
        format!("{} ({})", employee.full_name(), employee.employee_code),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(EmployeeResponse { employee, current })))
}

/// Copy provided fields onto the active model; returns whether anything was set
fn apply_update(active: &mut employee::ActiveModel, req: UpdateEmployeeRequest) -> bool {
    let mut changed = false;
    if let Some(v) = req.employee_code {
        active.employee_code = Set(v);
        changed = true;
    }
    if let Some(v) = req.first_name {
        active.first_name = Set(v);
        changed = true;
    }
    if let Some(v) = req.last_name {
        active.last_name = Set(v);
        changed = true;
    }
    if let Some(v) = req.email {
        active.email = Set(v);
        changed = true;
    }
    if let Some(v) = req.phone {
        active.phone = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.gender {
        active.gender = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.date_of_birth {
        active.date_of_birth = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.address {
        active.address = Set(Some(v));
        changed = true;
    }
    if let Some(v) = req.hire_date {
        active.hire_date = Set(v);
        changed = true;
    }
    changed
}

/// DELETE /api/employees/:id
pub async fn delete_employee(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    require_admin(&current_user)?;

    let existing = find_live_employee(&*state.db, id).await?;
    let desc = format!("{} ({})", existing.full_name(), existing.employee_code);

    let now = now_ts();
    let mut active: employee::ActiveModel = existing.into();
    active.deleted_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(&*state.db).await?;

    log_operation(&current_user.username, OpType::DeleteEmployee, desc, OpResult::Success);
    Ok(Json(ApiResponse::success_msg("employee deleted")))
}

/// POST /api/employees/:id/restore
pub async fn restore_employee(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<EmployeeResponse>>> {
    require_admin(&current_user)?;

    let existing = employee::Entity::find_by_id(id)
        .filter(employee::Column::DeletedAt.is_not_null())
        .one(&*state.db)
        .await?
        .ok_or_not_found(format!("no deleted employee {}", id))?;

    let mut active: employee::ActiveModel = existing.into();
    active.deleted_at = Set(None);
    active.updated_at = Set(now_ts());
    let employee = active.update(&*state.db).await?;
    let current = current_assignments(&*state.db, vec![id]).await?.remove(&id);

    log_operation(
        &current_user.username,
        OpType::RestoreEmployee,
        format!("{} ({})", employee.full_name(), employee.employee_code),
        OpResult::Success,
    );

    Ok(Json(ApiResponse::success(EmployeeResponse { employee, current })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::permission::Role;
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait};

    fn manager() -> CurrentUser {
        CurrentUser {
            id: 2,
            username: "manager".to_string(),
            full_name: "Morgan".to_string(),
            role: Role::Manager,
        }
    }

    fn sample(id: i64) -> employee::Model {
        employee::Model {
            id,
            employee_code: format!("E{:04}", id),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: format!("ada{}@example.com", id),
            phone: None,
            gender: None,
            date_of_birth: None,
            address: None,
            hire_date: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn test_list_excludes_soft_deleted() {
        let sql = live_employees().build(DatabaseBackend::Postgres).to_string();
        assert!(sql.contains(r#""deleted_at" IS NULL"#), "{}", sql);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let query = EmployeeListQuery {
            search: Some("  LoVe ".to_string()),
            ..Default::default()
        };
        let term = query.search_term().unwrap();
        assert_eq!(term, "love");

        let sql = live_employees()
            .filter(search_condition(&term))
            .build(DatabaseBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#"LOWER("first_name") LIKE '%love%' ESCAPE"#), "{}", sql);
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%"), r"%50\%%");
        assert_eq!(like_pattern("a_b"), r"%a\_b%");
        assert_eq!(like_pattern(r"c:\x"), r"%c:\\x%");
    }

    #[test]
    fn test_blank_search_ignored() {
        let query = EmployeeListQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(query.search_term().is_none());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let body = r#"{"employee_code":"E1","first_name":"A","last_name":"B","hire_date":"2024-01-01"}"#;
        assert!(serde_json::from_str::<CreateEmployeeRequest>(body).is_err());
    }

    #[test]
    fn test_create_validation() {
        let body = r#"{"employee_code":"E1","first_name":"","last_name":"B","email":"not-an-email",
            "hire_date":"2024-01-01","department":{"department":"R&D","designation":"Eng","salary":-1}}"#;
        let req: CreateEmployeeRequest = serde_json::from_str(body).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("department"));
    }

    #[test]
    fn test_apply_update_only_touches_provided_fields() {
        let mut active: employee::ActiveModel = sample(1).into();
        let changed = apply_update(
            &mut active,
            UpdateEmployeeRequest {
                phone: Some("555-0100".to_string()),
                ..Default::default()
            },
        );
        assert!(changed);
        assert!(active.phone.is_set());
        assert!(!active.first_name.is_set());

        let mut untouched: employee::ActiveModel = sample(1).into();
        assert!(!apply_update(&mut untouched, UpdateEmployeeRequest::default()));
    }

    #[tokio::test]
    async fn test_get_missing_employee_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<employee::Model>::new()])
            .into_connection();
        let state = AppState::new(db, Config::default());

        let err = get_employee(State(state), ApiPath(42)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_with_duplicate_email_conflicts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![sample(1)]])
            .into_connection();
        let state = AppState::new(db, Config::default());

        let req = CreateEmployeeRequest {
            employee_code: "NEW-1".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "ada1@example.com".to_string(),
            phone: None,
            gender: None,
            date_of_birth: None,
            address: None,
            hire_date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            department: None,
        };
        let err = create_employee(State(state), Extension(manager()), ValidatedJson(req))
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(msg) => assert!(msg.starts_with("email")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manager_cannot_delete() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let state = AppState::new(db, Config::default());
        let err = delete_employee(State(state), Extension(manager()), ApiPath(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
