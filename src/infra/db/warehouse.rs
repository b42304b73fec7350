//! Read-only queries against the warehouse movement view.
//!
//! Every report reads `warehouse.v_material_movement`, restricted to issue
//! movements. Quantities arrive as text in the source system; rows whose
//! quantity is not numeric count as zero. Filterable queries always carry the
//! `$1` material predicate and bind `NULL` when unfiltered.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query_scalar;
use tracing::debug;

use crate::application::repos::WarehouseGateway;
use crate::domain::{ReportFilter, ReportKind};
use crate::infra::error::InfraError;

use super::PostgresRepositories;

const CURRENT_MONTH_PROJECTION_SQL: &str = r"
    WITH month_to_date AS (
        SELECT
            COALESCE(SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                              THEN m.quantity::text::numeric ELSE 0 END), 0) AS consumption_to_date,
            EXTRACT(DAY FROM CURRENT_DATE)::int AS days_elapsed,
            EXTRACT(DAY FROM (date_trunc('month', CURRENT_DATE) + INTERVAL '1 month - 1 day'))::int AS days_in_month
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE)
    )
    SELECT
        consumption_to_date,
        days_elapsed,
        days_in_month,
        ROUND(consumption_to_date / GREATEST(days_elapsed, 1) * days_in_month, 2) AS projected_month_consumption
    FROM month_to_date";

const FILTERED_MONTH_PROJECTION_SQL: &str = r"
    WITH month_to_date AS (
        SELECT
            COALESCE(SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                              THEN m.quantity::text::numeric ELSE 0 END), 0) AS consumption_to_date,
            EXTRACT(DAY FROM CURRENT_DATE)::int AS days_elapsed,
            EXTRACT(DAY FROM (date_trunc('month', CURRENT_DATE) + INTERVAL '1 month - 1 day'))::int AS days_in_month
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE)
          AND ($1::integer IS NULL OR m.material_code = $1)
    )
    SELECT
        consumption_to_date,
        days_elapsed,
        days_in_month,
        ROUND(consumption_to_date / GREATEST(days_elapsed, 1) * days_in_month, 2) AS projected_month_consumption
    FROM month_to_date";

const ABRUPT_GROWTH_SQL: &str = r"
    WITH prev_month AS (
        SELECT
            m.material_name AS material,
            m.material_code,
            SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                     THEN m.quantity::text::numeric ELSE 0 END) AS previous_month_consumption
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE) - INTERVAL '1 month'
          AND m.movement_date < date_trunc('month', CURRENT_DATE)
        GROUP BY 1, 2
    ),
    cur_month AS (
        SELECT
            m.material_name AS material,
            m.material_code,
            SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                     THEN m.quantity::text::numeric ELSE 0 END) AS current_month_consumption
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE)
        GROUP BY 1, 2
    )
    SELECT
        c.material,
        c.material_code,
        p.previous_month_consumption,
        c.current_month_consumption,
        ROUND((c.current_month_consumption - p.previous_month_consumption)
              / p.previous_month_consumption * 100, 1) AS growth_pct
    FROM cur_month c
    INNER JOIN prev_month p
        ON p.material_code = c.material_code AND p.material = c.material
    WHERE p.previous_month_consumption > 0
      AND c.current_month_consumption > p.previous_month_consumption * 1.3
    ORDER BY growth_pct DESC";

const DORMANT_MATERIALS_SQL: &str = r"
    SELECT
        m.material_name AS material,
        m.material_code,
        to_char(MAX(m.movement_date), 'YYYY-MM') AS last_consumption_month
    FROM warehouse.v_material_movement m
    WHERE m.movement_code = 'ISSUE'
    GROUP BY 1, 2
    HAVING MAX(m.movement_date) < date_trunc('month', CURRENT_DATE) - INTERVAL '6 months'
    ORDER BY MAX(m.movement_date)";

const CONSUMPTION_BY_COST_CENTER_SQL: &str = r"
    WITH monthly AS (
        SELECT
            m.cost_center,
            date_trunc('month', m.movement_date) AS month_start,
            SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                     THEN m.quantity::text::numeric ELSE 0 END) AS monthly_consumption
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE) - INTERVAL '6 months'
          AND m.movement_date < date_trunc('month', CURRENT_DATE)
          AND ($1::integer IS NULL OR m.material_code = $1)
        GROUP BY 1, 2
    )
    SELECT
        cost_center,
        ROUND(AVG(monthly_consumption), 2) AS six_month_average
    FROM monthly
    GROUP BY 1
    ORDER BY six_month_average DESC";

const CRITICAL_MATERIALS_SQL: &str = r"
    WITH monthly AS (
        SELECT
            m.material_name AS material,
            m.material_code,
            date_trunc('month', m.movement_date) AS month_start,
            SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                     THEN m.quantity::text::numeric ELSE 0 END) AS monthly_consumption
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= DATE '2023-01-01'
        GROUP BY 1, 2, 3
    )
    SELECT
        material,
        material_code,
        ROUND(AVG(monthly_consumption), 2) AS monthly_average
    FROM monthly
    GROUP BY 1, 2
    ORDER BY monthly_average DESC
    LIMIT 20";

const CONSUMPTION_VALUE_SQL: &str = r"
    SELECT
        m.material_name AS material,
        m.material_code,
        SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                 THEN m.quantity::text::numeric ELSE 0 END) AS total_consumption,
        ROUND(SUM(COALESCE(m.orig_value, 0)), 2) AS total_value
    FROM warehouse.v_material_movement m
    WHERE m.movement_code = 'ISSUE'
      AND m.movement_date >= DATE '2023-01-01'
    GROUP BY 1, 2
    ORDER BY total_value DESC";

const MONTHLY_CONSUMPTION_HISTORY_SQL: &str = r"
    SELECT
        to_char(date_trunc('month', m.movement_date), 'YYYY-MM') AS month_ref,
        SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                 THEN m.quantity::text::numeric ELSE 0 END) AS monthly_consumption
    FROM warehouse.v_material_movement m
    WHERE m.movement_code = 'ISSUE'
      AND m.movement_date >= DATE '2023-01-01'
      AND ($1::integer IS NULL OR m.material_code = $1)
    GROUP BY 1
    ORDER BY 1";

const MATERIALS_SQL: &str = r"
    SELECT DISTINCT
        m.material_code,
        m.material_name AS material
    FROM warehouse.v_material_movement m
    WHERE m.movement_code = 'ISSUE'
    ORDER BY material";

const SIX_MONTH_AVERAGE_SQL: &str = r"
    WITH monthly AS (
        SELECT
            date_trunc('month', m.movement_date) AS month_start,
            SUM(CASE WHEN m.quantity::text ~ '^-?[0-9]+(\.[0-9]+)?$'
                     THEN m.quantity::text::numeric ELSE 0 END) AS monthly_consumption
        FROM warehouse.v_material_movement m
        WHERE m.movement_code = 'ISSUE'
          AND m.movement_date >= date_trunc('month', CURRENT_DATE) - INTERVAL '6 months'
          AND m.movement_date < date_trunc('month', CURRENT_DATE)
          AND ($1::integer IS NULL OR m.material_code = $1)
        GROUP BY 1
    )
    SELECT ROUND(COALESCE(AVG(monthly_consumption), 0), 2) AS six_month_average
    FROM monthly";

fn report_sql(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::CurrentMonthProjection => CURRENT_MONTH_PROJECTION_SQL,
        ReportKind::AbruptGrowth => ABRUPT_GROWTH_SQL,
        ReportKind::DormantMaterials => DORMANT_MATERIALS_SQL,
        ReportKind::ConsumptionByCostCenter => CONSUMPTION_BY_COST_CENTER_SQL,
        ReportKind::CriticalMaterials => CRITICAL_MATERIALS_SQL,
        ReportKind::ConsumptionValue => CONSUMPTION_VALUE_SQL,
        ReportKind::MonthlyConsumptionHistory => MONTHLY_CONSUMPTION_HISTORY_SQL,
        ReportKind::FilteredMonthProjection => FILTERED_MONTH_PROJECTION_SQL,
        ReportKind::Materials => MATERIALS_SQL,
        ReportKind::SixMonthAverage => SIX_MONTH_AVERAGE_SQL,
    }
}

#[async_trait]
impl WarehouseGateway for PostgresRepositories {
    async fn execute(
        &self,
        kind: ReportKind,
        filter: ReportFilter,
    ) -> Result<Vec<Value>, InfraError> {
        // Aggregate to JSON in the database so row shapes stay opaque here.
        let sql = format!(
            "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) FROM ({}) AS t",
            report_sql(kind)
        );

        let query = query_scalar::<_, Value>(&sql);
        let payload = if kind.filterable() {
            query.bind(filter.material_code).fetch_one(self.pool()).await
        } else {
            query.fetch_one(self.pool()).await
        }
        .map_err(|err| InfraError::database(err.to_string()))?;

        match payload {
            Value::Array(rows) => {
                debug!(endpoint = kind.endpoint(), rows = rows.len(), "warehouse query done");
                Ok(rows)
            }
            Value::Null => Ok(Vec::new()),
            other => Err(InfraError::database(format!(
                "warehouse query returned non-array payload: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_report_has_a_query() {
        for kind in ReportKind::ALL {
            assert!(!report_sql(kind).trim().is_empty());
        }
    }

    #[test]
    fn filterable_queries_carry_the_material_predicate() {
        for kind in ReportKind::ALL {
            let has_bind = report_sql(kind).contains("$1::integer");
            assert_eq!(
                has_bind,
                kind.filterable(),
                "predicate mismatch for {}",
                kind.endpoint()
            );
        }
    }
}
