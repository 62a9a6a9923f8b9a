//! Spend trends, month-end projection and budget alerts.
//!
//! Everything here is derived from the usage ledger when asked for; nothing
//! is sampled in the background.

use crate::cost::{CostTracker, UsageRecord};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use gateway_core::BudgetSettings;
use serde::Serialize;
use tracing::debug;

/// Daily alert thresholds in percent of the limit, highest first
const DAILY_THRESHOLDS: [u8; 3] = [100, 90, 75];

/// Monthly alert thresholds in percent of the limit, highest first
const MONTHLY_THRESHOLDS: [u8; 4] = [100, 90, 75, 50];

/// Days into the month at which the day-count part of confidence saturates
const FULL_CONFIDENCE_DAYS: f64 = 7.0;

/// Records in the month at which the sample part of confidence saturates
const FULL_CONFIDENCE_RECORDS: f64 = 100.0;

/// Activity inside one trailing window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendTrend {
    /// Window length in hours
    pub window_hours: f64,
    /// Spend in USD
    pub spend_usd: f64,
    /// Requests, cached ones included
    pub requests: u64,
    /// Prompt plus completion tokens
    pub tokens: u64,
    /// Spend per hour over the window
    pub spend_per_hour: f64,
    /// Requests per hour over the window
    pub requests_per_hour: f64,
}

impl SpendTrend {
    fn over(records: &[UsageRecord], now: DateTime<Utc>, window: Duration) -> Self {
        let since = now - window;
        let hours = window.num_seconds() as f64 / 3600.0;
        let mut trend = Self {
            window_hours: hours,
            ..Self::default()
        };
        for record in records
            .iter()
            .filter(|r| r.timestamp > since && r.timestamp <= now)
        {
            trend.spend_usd += record.cost_usd;
            trend.requests += 1;
            trend.tokens += u64::from(record.prompt_tokens) + u64::from(record.completion_tokens);
        }
        trend.spend_per_hour = trend.spend_usd / hours;
        trend.requests_per_hour = trend.requests as f64 / hours;
        trend
    }
}

/// Trailing hour, day and week
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendTrends {
    /// Last hour
    pub last_hour: SpendTrend,
    /// Last 24 hours
    pub last_day: SpendTrend,
    /// Last 7 days
    pub last_week: SpendTrend,
}

/// Linear projection of the current UTC month
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostForecast {
    /// Spend so far this month
    pub month_to_date_usd: f64,
    /// Projected spend at month end
    pub projected_month_usd: f64,
    /// Month-to-date spend per elapsed day
    pub daily_average_usd: f64,
    /// Days elapsed, fractional, at least one
    pub days_elapsed: f64,
    /// Days left in the month
    pub days_remaining: f64,
    /// 0.0 to 1.0; grows with elapsed days and with the number of records
    pub confidence: f64,
    /// Monthly limit, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_budget_usd: Option<f64>,
    /// Projection as a percentage of the monthly limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_of_budget: Option<f64>,
    /// Projection is above the monthly limit
    pub will_exceed_budget: bool,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Threshold below 90%
    Info,
    /// 90% reached, or projected to exceed
    Warning,
    /// Limit reached
    Critical,
}

/// Budget window an alert refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertWindow {
    /// Current UTC day
    Daily,
    /// Current UTC month
    Monthly,
    /// Month-end projection
    Projected,
}

impl AlertWindow {
    fn label(self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Monthly => "Monthly",
            Self::Projected => "Projected monthly",
        }
    }
}

/// A budget threshold that has been crossed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    /// Severity
    pub level: AlertLevel,
    /// Window
    pub window: AlertWindow,
    /// Highest threshold crossed, in percent
    pub threshold_percent: u8,
    /// Spend as a percentage of the limit
    pub percent: f64,
    /// Spend, or projected spend for [`AlertWindow::Projected`]
    pub spend_usd: f64,
    /// Limit
    pub budget_usd: f64,
    /// Human-readable summary
    pub message: String,
}

impl BudgetAlert {
    /// Alert for the highest threshold `spend` has crossed, if any
    fn crossed(window: AlertWindow, spend: f64, limit: f64, thresholds: &[u8]) -> Option<Self> {
        if limit <= 0.0 {
            return None;
        }
        let percent = spend / limit * 100.0;
        let threshold = thresholds
            .iter()
            .copied()
            .find(|t| percent >= f64::from(*t))?;
        let (level, message) = match threshold {
            100 => (
                AlertLevel::Critical,
                format!("{} budget exceeded", window.label()),
            ),
            90 => (
                AlertLevel::Warning,
                format!("{} budget at {threshold}%", window.label()),
            ),
            _ => (
                AlertLevel::Info,
                format!("{} budget at {threshold}%", window.label()),
            ),
        };
        Some(Self {
            level,
            window,
            threshold_percent: threshold,
            percent,
            spend_usd: spend,
            budget_usd: limit,
            message,
        })
    }
}

/// Trends, projection and alerts for one tenant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAnalytics {
    /// Trailing windows
    pub trends: SpendTrends,
    /// Month-end projection
    pub forecast: CostForecast,
    /// Crossed thresholds; empty without a budget
    pub alerts: Vec<BudgetAlert>,
}

fn days_in_month(now: DateTime<Utc>) -> u32 {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map_or(30, |last| last.day())
}

impl CostTracker {
    /// Trailing-window activity for a tenant
    #[must_use]
    pub fn trends(&self, tenant_id: &str) -> SpendTrends {
        self.trends_at(tenant_id, Utc::now())
    }

    /// [`trends`](Self::trends) against an explicit clock
    #[must_use]
    pub fn trends_at(&self, tenant_id: &str, now: DateTime<Utc>) -> SpendTrends {
        let records = self.snapshot(tenant_id);
        SpendTrends {
            last_hour: SpendTrend::over(&records, now, Duration::hours(1)),
            last_day: SpendTrend::over(&records, now, Duration::hours(24)),
            last_week: SpendTrend::over(&records, now, Duration::days(7)),
        }
    }

    /// Project this month's spend to month end
    #[must_use]
    pub fn forecast(&self, tenant_id: &str, budget: Option<&BudgetSettings>) -> CostForecast {
        self.forecast_at(tenant_id, budget, Utc::now())
    }

    /// [`forecast`](Self::forecast) against an explicit clock.
    ///
    /// Elapsed time counts from midnight on the 1st and never drops below
    /// one day, so a single early request is not extrapolated from minutes.
    #[must_use]
    pub fn forecast_at(
        &self,
        tenant_id: &str,
        budget: Option<&BudgetSettings>,
        now: DateTime<Utc>,
    ) -> CostForecast {
        let records = self.snapshot(tenant_id);
        let (month_records, month_to_date) = records
            .iter()
            .filter(|r| {
                r.timestamp <= now
                    && r.timestamp.year() == now.year()
                    && r.timestamp.month() == now.month()
            })
            .fold((0_usize, 0.0_f64), |(n, spend), r| (n + 1, spend + r.cost_usd));

        let month_days = f64::from(days_in_month(now));
        let elapsed = f64::from(now.day() - 1)
            + f64::from(now.num_seconds_from_midnight()) / 86_400.0;
        let days_elapsed = elapsed.clamp(1.0, month_days);
        let days_remaining = month_days - days_elapsed;

        let daily_average_usd = month_to_date / days_elapsed;
        let projected_month_usd = month_to_date + daily_average_usd * days_remaining;

        let confidence = (days_elapsed / FULL_CONFIDENCE_DAYS).min(1.0) * 0.7
            + (month_records as f64 / FULL_CONFIDENCE_RECORDS).min(1.0) * 0.3;

        let monthly_budget_usd = budget
            .and_then(|b| b.monthly_usd)
            .filter(|limit| *limit > 0.0);
        let percent_of_budget = monthly_budget_usd.map(|limit| projected_month_usd / limit * 100.0);

        CostForecast {
            month_to_date_usd: month_to_date,
            projected_month_usd,
            daily_average_usd,
            days_elapsed,
            days_remaining,
            confidence,
            monthly_budget_usd,
            percent_of_budget,
            will_exceed_budget: monthly_budget_usd.is_some_and(|limit| projected_month_usd > limit),
        }
    }

    /// Budget thresholds a tenant has crossed
    #[must_use]
    pub fn alerts(&self, tenant_id: &str, budget: &BudgetSettings) -> Vec<BudgetAlert> {
        self.alerts_at(tenant_id, budget, Utc::now())
    }

    /// [`alerts`](Self::alerts) against an explicit clock.
    ///
    /// At most one alert per window: the highest threshold crossed. A
    /// projection above the monthly limit adds a warning of its own.
    #[must_use]
    pub fn alerts_at(
        &self,
        tenant_id: &str,
        budget: &BudgetSettings,
        now: DateTime<Utc>,
    ) -> Vec<BudgetAlert> {
        let spend = self.spend_at(tenant_id, now);
        let mut alerts = Vec::new();

        if let Some(limit) = budget.daily_usd {
            alerts.extend(BudgetAlert::crossed(
                AlertWindow::Daily,
                spend.daily_usd,
                limit,
                &DAILY_THRESHOLDS,
            ));
        }
        if let Some(limit) = budget.monthly_usd {
            alerts.extend(BudgetAlert::crossed(
                AlertWindow::Monthly,
                spend.monthly_usd,
                limit,
                &MONTHLY_THRESHOLDS,
            ));
        }

        let forecast = self.forecast_at(tenant_id, Some(budget), now);
        if let (true, Some(limit)) = (forecast.will_exceed_budget, forecast.monthly_budget_usd) {
            alerts.push(BudgetAlert {
                level: AlertLevel::Warning,
                window: AlertWindow::Projected,
                threshold_percent: 100,
                percent: forecast.percent_of_budget.unwrap_or_default(),
                spend_usd: forecast.projected_month_usd,
                budget_usd: limit,
                message: "Projected to exceed monthly budget".to_string(),
            });
        }

        if !alerts.is_empty() {
            debug!(tenant = %tenant_id, alerts = alerts.len(), "Budget alerts raised");
        }
        alerts
    }

    /// Trends, projection and, when a budget is given, alerts
    #[must_use]
    pub fn analytics(&self, tenant_id: &str, budget: Option<&BudgetSettings>) -> CostAnalytics {
        self.analytics_at(tenant_id, budget, Utc::now())
    }

    /// [`analytics`](Self::analytics) against an explicit clock
    #[must_use]
    pub fn analytics_at(
        &self,
        tenant_id: &str,
        budget: Option<&BudgetSettings>,
        now: DateTime<Utc>,
    ) -> CostAnalytics {
        CostAnalytics {
            trends: self.trends_at(tenant_id, now),
            forecast: self.forecast_at(tenant_id, budget, now),
            alerts: budget
                .map(|b| self.alerts_at(tenant_id, b, now))
                .unwrap_or_default(),
        }
    }
}
