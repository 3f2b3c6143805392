//! Feature extraction queries for downstream consumers.
//!
//! Forecasting jobs read the warehouse through one aggregation: daily sales
//! rolled up over the fact table joined to the time dimension. The query and
//! its column aliases are a published contract; changing them breaks
//! consumers that select by name.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::LoadResult;
use crate::table::DATE_FORMAT;

/// One day of aggregated sales activity.
#[derive(Debug, Clone, Serialize)]
pub struct DailySales {
    pub order_date: NaiveDate,
    pub order_year: i64,
    pub order_month: i64,
    pub total_sales: f64,
    pub total_profit: f64,
    pub total_quantity: i64,
    pub avg_discount: f64,
    pub avg_shipping_cost: f64,
}

const SALES_BY_DATE_SQL: &str = "
SELECT
    t.OrderDate,
    t.OrderYear,
    t.OrderMonth,
    SUM(f.Sales) AS TotalSales,
    SUM(f.Profit) AS TotalProfit,
    SUM(f.Quantity) AS TotalQuantity,
    AVG(f.Discount) AS AvgDiscount,
    AVG(f.ShippingCost) AS AvgShippingCost
FROM Sales_Fact f
JOIN Time_Dim t ON f.OrderDate = t.OrderDate
GROUP BY t.OrderDate, t.OrderYear, t.OrderMonth
ORDER BY t.OrderDate
";

/// Aggregate the fact table per order date, joined to the time dimension.
///
/// Rows come back in ascending date order, one per distinct order date.
pub fn sales_by_date(conn: &Connection) -> LoadResult<Vec<DailySales>> {
    let mut stmt = conn.prepare(SALES_BY_DATE_SQL)?;
    let rows = stmt.query_map([], |row| {
        let date_text: String = row.get(0)?;
        let order_date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        Ok(DailySales {
            order_date,
            order_year: row.get(1)?,
            order_month: row.get(2)?,
            total_sales: row.get(3)?,
            total_profit: row.get(4)?,
            total_quantity: row.get(5)?,
            avg_discount: row.get(6)?,
            avg_shipping_cost: row.get(7)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
