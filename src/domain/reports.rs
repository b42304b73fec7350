//! Report catalog.
//!
//! Every read operation the service exposes is one of these kinds. The kind
//! carries everything the generic pipeline needs: endpoint name, whether a
//! material filter applies, which row fields are mandatory, the
//! post-processing sort key, and the cache tier.

use crate::cache::TtlTier;

/// Direction of the post-processing sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Optional per-report filter. Invalid or absent filter values degrade to
/// "no filter"; the gateway binds the code as a SQL parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub material_code: Option<i32>,
}

impl ReportFilter {
    pub fn by_material(code: i32) -> Self {
        Self {
            material_code: Some(code),
        }
    }

    /// Parse a raw filter value as it arrives over the wire. Mirrors the
    /// dashboard convention where `all` and empty mean "unfiltered";
    /// fractional values are truncated, anything else is ignored.
    pub fn parse_material_code(raw: &str) -> Option<i32> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return None;
        }
        if let Ok(code) = trimmed.parse::<i64>() {
            return i32::try_from(code).ok();
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            if value.is_finite() {
                let truncated = value.trunc();
                if truncated >= f64::from(i32::MIN) && truncated <= f64::from(i32::MAX) {
                    return Some(truncated as i32);
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Projected month-end consumption from the partial current month.
    CurrentMonthProjection,
    /// Materials whose month-over-month consumption grew more than 30%.
    AbruptGrowth,
    /// Materials with no recorded consumption for at least six months.
    DormantMaterials,
    /// Six-month average consumption per requesting cost center.
    ConsumptionByCostCenter,
    /// Top 20 materials by monthly average consumption.
    CriticalMaterials,
    /// Consumption volume against financial value per material.
    ConsumptionValue,
    /// Monthly consumption series since 2023.
    MonthlyConsumptionHistory,
    /// Current-month projection narrowed to one material.
    FilteredMonthProjection,
    /// Catalog of known materials for filter pickers.
    Materials,
    /// Average of the latest six monthly consumptions.
    SixMonthAverage,
}

impl ReportKind {
    pub const ALL: [ReportKind; 10] = [
        ReportKind::CurrentMonthProjection,
        ReportKind::AbruptGrowth,
        ReportKind::DormantMaterials,
        ReportKind::ConsumptionByCostCenter,
        ReportKind::CriticalMaterials,
        ReportKind::ConsumptionValue,
        ReportKind::MonthlyConsumptionHistory,
        ReportKind::FilteredMonthProjection,
        ReportKind::Materials,
        ReportKind::SixMonthAverage,
    ];

    /// Endpoint segment under `/api/`, doubling as the logical cache
    /// namespace.
    pub fn endpoint(self) -> &'static str {
        match self {
            ReportKind::CurrentMonthProjection => "current-month-projection",
            ReportKind::AbruptGrowth => "abrupt-growth",
            ReportKind::DormantMaterials => "dormant-materials",
            ReportKind::ConsumptionByCostCenter => "consumption-by-cost-center",
            ReportKind::CriticalMaterials => "critical-materials",
            ReportKind::ConsumptionValue => "consumption-value",
            ReportKind::MonthlyConsumptionHistory => "monthly-consumption-history",
            ReportKind::FilteredMonthProjection => "filtered-month-projection",
            ReportKind::Materials => "materials",
            ReportKind::SixMonthAverage => "six-month-average",
        }
    }

    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.endpoint() == endpoint)
    }

    /// Whether the report accepts the optional material filter.
    pub fn filterable(self) -> bool {
        matches!(
            self,
            ReportKind::ConsumptionByCostCenter
                | ReportKind::MonthlyConsumptionHistory
                | ReportKind::FilteredMonthProjection
                | ReportKind::SixMonthAverage
        )
    }

    /// Row fields that must be non-null; rows missing one are dropped during
    /// normalization.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ReportKind::CurrentMonthProjection | ReportKind::FilteredMonthProjection => {
                &["consumption_to_date", "projected_month_consumption"]
            }
            ReportKind::AbruptGrowth => &["material", "growth_pct"],
            ReportKind::DormantMaterials => &["material", "last_consumption_month"],
            ReportKind::ConsumptionByCostCenter => &["cost_center", "six_month_average"],
            ReportKind::CriticalMaterials => &["material", "monthly_average"],
            ReportKind::ConsumptionValue => &["material", "total_consumption", "total_value"],
            ReportKind::MonthlyConsumptionHistory => &["month_ref", "monthly_consumption"],
            ReportKind::Materials => &["material_code", "material"],
            ReportKind::SixMonthAverage => &["six_month_average"],
        }
    }

    /// Post-processing sort key; `None` keeps the SQL ordering.
    pub fn sort_key(self) -> Option<(&'static str, SortOrder)> {
        match self {
            ReportKind::CriticalMaterials => Some(("monthly_average", SortOrder::Descending)),
            ReportKind::ConsumptionValue => Some(("total_value", SortOrder::Descending)),
            ReportKind::MonthlyConsumptionHistory => Some(("month_ref", SortOrder::Ascending)),
            ReportKind::Materials => Some(("material", SortOrder::Ascending)),
            _ => None,
        }
    }

    pub fn ttl_tier(self) -> TtlTier {
        match self {
            ReportKind::CurrentMonthProjection | ReportKind::FilteredMonthProjection => {
                TtlTier::Projection
            }
            ReportKind::Materials => TtlTier::Catalog,
            _ => TtlTier::Historical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_round_trip() {
        for kind in ReportKind::ALL {
            assert_eq!(ReportKind::from_endpoint(kind.endpoint()), Some(kind));
        }
        assert_eq!(ReportKind::from_endpoint("unknown-report"), None);
    }

    #[test]
    fn filterable_reports_match_catalog() {
        let filterable: Vec<_> = ReportKind::ALL
            .into_iter()
            .filter(|kind| kind.filterable())
            .collect();
        assert_eq!(
            filterable,
            vec![
                ReportKind::ConsumptionByCostCenter,
                ReportKind::MonthlyConsumptionHistory,
                ReportKind::FilteredMonthProjection,
                ReportKind::SixMonthAverage,
            ]
        );
    }

    #[test]
    fn material_code_parsing_degrades_to_unfiltered() {
        assert_eq!(ReportFilter::parse_material_code("123"), Some(123));
        assert_eq!(ReportFilter::parse_material_code(" 123 "), Some(123));
        assert_eq!(ReportFilter::parse_material_code("123.9"), Some(123));
        assert_eq!(ReportFilter::parse_material_code("-7"), Some(-7));
        assert_eq!(ReportFilter::parse_material_code("all"), None);
        assert_eq!(ReportFilter::parse_material_code(""), None);
        assert_eq!(ReportFilter::parse_material_code("abc"), None);
        assert_eq!(ReportFilter::parse_material_code("99999999999"), None);
    }

    #[test]
    fn projections_are_short_lived_and_catalog_is_long_lived() {
        assert_eq!(
            ReportKind::CurrentMonthProjection.ttl_tier(),
            TtlTier::Projection
        );
        assert_eq!(ReportKind::Materials.ttl_tier(), TtlTier::Catalog);
        assert_eq!(
            ReportKind::MonthlyConsumptionHistory.ttl_tier(),
            TtlTier::Historical
        );
    }
}
