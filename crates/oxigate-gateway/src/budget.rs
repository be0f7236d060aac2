//! Budget accounting: reservations, commits, and rolling spend windows.
//!
//! Every provider call is bracketed by a reservation of its estimated cost
//! and either a commit of the measured cost or a full release. All
//! arithmetic for one operation happens under a single lock, which is what
//! makes the core guarantee hold: concurrent reservations can never
//! collectively push a window past its ceiling.
//!
//! Windows are UTC: calendar day, ISO week (Monday start), calendar month.
//! A window rolls over lazily — the first operation after a boundary
//! resets its accumulated spend and advances its start.

use chrono::{DateTime, Datelike, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use oxigate_core::config::{CeilingSet, ProviderSettings, WindowKind};

use crate::SharedConfig;

// ─────────────────────────────────────────────
// Alerts and rejections
// ─────────────────────────────────────────────

/// Whose ceiling a rejection or alert refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BudgetScope {
    Global,
    Provider(String),
}

impl std::fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetScope::Global => f.write_str("global"),
            BudgetScope::Provider(name) => f.write_str(name),
        }
    }
}

/// Informational event fired when spend crosses the alert threshold of a
/// ceiling. Never blocks or rejects anything by itself.
#[derive(Clone, Debug)]
pub struct BudgetAlert {
    pub scope: BudgetScope,
    pub window: WindowKind,
    pub spent: f64,
    pub ceiling: f64,
}

/// Why a reservation was refused.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetRejection {
    pub scope: BudgetScope,
    pub window: WindowKind,
    pub ceiling: f64,
    /// What the window's spend-plus-reservations would have become.
    pub attempted: f64,
}

impl std::fmt::Display for BudgetRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ceiling ${:.2} would be exceeded (${:.2})",
            self.scope,
            self.window.as_str(),
            self.ceiling,
            self.attempted
        )
    }
}

/// Proof of a held reservation. Move-only: spend it on exactly one
/// `commit` or `release`.
#[derive(Debug)]
pub struct ReservationToken {
    id: u64,
}

// ─────────────────────────────────────────────
// Windows
// ─────────────────────────────────────────────

fn window_start(kind: WindowKind, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let start_date = match kind {
        WindowKind::Day => date,
        WindowKind::Week => {
            date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        WindowKind::Month => date.with_day(1).unwrap_or(date),
    };
    match start_date.and_hms_opt(0, 0, 0) {
        Some(midnight) => midnight.and_utc(),
        None => now,
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    start: DateTime<Utc>,
    spent: f64,
    reserved: f64,
}

impl Window {
    fn new(kind: WindowKind, now: DateTime<Utc>) -> Self {
        Window {
            start: window_start(kind, now),
            spent: 0.0,
            reserved: 0.0,
        }
    }

    /// Reset if the window boundary has been crossed since the last
    /// operation.
    fn roll(&mut self, kind: WindowKind, now: DateTime<Utc>) {
        let start = window_start(kind, now);
        if start != self.start {
            self.start = start;
            self.spent = 0.0;
            self.reserved = 0.0;
        }
    }

    fn in_flight(&self) -> f64 {
        self.spent + self.reserved
    }
}

#[derive(Clone, Copy, Debug)]
struct WindowSet {
    day: Window,
    week: Window,
    month: Window,
}

impl WindowSet {
    fn new(now: DateTime<Utc>) -> Self {
        WindowSet {
            day: Window::new(WindowKind::Day, now),
            week: Window::new(WindowKind::Week, now),
            month: Window::new(WindowKind::Month, now),
        }
    }

    fn get_mut(&mut self, kind: WindowKind) -> &mut Window {
        match kind {
            WindowKind::Day => &mut self.day,
            WindowKind::Week => &mut self.week,
            WindowKind::Month => &mut self.month,
        }
    }

    fn roll_all(&mut self, now: DateTime<Utc>) {
        for kind in WindowKind::ALL {
            self.get_mut(kind).roll(kind, now);
        }
    }
}

// ─────────────────────────────────────────────
// BudgetManager
// ─────────────────────────────────────────────

#[derive(Debug)]
struct Reservation {
    provider: String,
    amount: f64,
}

struct Book {
    global: WindowSet,
    providers: HashMap<String, WindowSet>,
    reservations: HashMap<u64, Reservation>,
    next_token: u64,
}

/// Spend accounting for all providers plus the global scope.
pub struct BudgetManager {
    config: SharedConfig,
    book: Mutex<Book>,
    alerts: broadcast::Sender<BudgetAlert>,
}

impl BudgetManager {
    pub fn new(config: SharedConfig) -> Self {
        let (alerts, _) = broadcast::channel(32);
        BudgetManager {
            config,
            book: Mutex::new(Book {
                global: WindowSet::new(Utc::now()),
                providers: HashMap::new(),
                reservations: HashMap::new(),
                next_token: 1,
            }),
            alerts,
        }
    }

    /// Subscribe to threshold-crossing alerts (admin reporting).
    pub fn subscribe(&self) -> broadcast::Receiver<BudgetAlert> {
        self.alerts.subscribe()
    }

    /// Reserve `estimated` dollars against the provider's and the global
    /// windows, or explain which ceiling refused it.
    pub fn reserve(
        &self,
        provider: &ProviderSettings,
        estimated: f64,
    ) -> Result<ReservationToken, BudgetRejection> {
        self.reserve_at(provider, estimated, Utc::now())
    }

    fn reserve_at(
        &self,
        provider: &ProviderSettings,
        estimated: f64,
        now: DateTime<Utc>,
    ) -> Result<ReservationToken, BudgetRejection> {
        let (global_ceilings, enforce) = {
            let config = self.read_config();
            (config.budget.global, config.budget.auto_disable)
        };

        let mut book = self.lock_book();

        book.global.roll_all(now);
        let provider_set = book
            .providers
            .entry(provider.name.clone())
            .or_insert_with(|| WindowSet::new(now));
        provider_set.roll_all(now);

        if enforce {
            // Provider ceilings first, then global — first refusal wins.
            for kind in WindowKind::ALL {
                if let Some(ceiling) = provider.ceilings.get(kind) {
                    let attempted = provider_set.get_mut(kind).in_flight() + estimated;
                    if attempted > ceiling {
                        return Err(BudgetRejection {
                            scope: BudgetScope::Provider(provider.name.clone()),
                            window: kind,
                            ceiling,
                            attempted,
                        });
                    }
                }
            }
            for kind in WindowKind::ALL {
                if let Some(ceiling) = global_ceilings.get(kind) {
                    let attempted = book.global.get_mut(kind).in_flight() + estimated;
                    if attempted > ceiling {
                        return Err(BudgetRejection {
                            scope: BudgetScope::Global,
                            window: kind,
                            ceiling,
                            attempted,
                        });
                    }
                }
            }
        }

        if let Some(provider_set) = book.providers.get_mut(&provider.name) {
            for kind in WindowKind::ALL {
                provider_set.get_mut(kind).reserved += estimated;
            }
        }
        for kind in WindowKind::ALL {
            book.global.get_mut(kind).reserved += estimated;
        }

        let id = book.next_token;
        book.next_token += 1;
        book.reservations.insert(
            id,
            Reservation {
                provider: provider.name.clone(),
                amount: estimated,
            },
        );

        debug!(provider = %provider.name, estimated, token = id, "Budget reserved");
        Ok(ReservationToken { id })
    }

    /// Replace a reservation with the measured cost of the call.
    pub fn commit(&self, token: ReservationToken, actual: f64) {
        self.commit_at(token, actual, Utc::now());
    }

    fn commit_at(&self, token: ReservationToken, actual: f64, now: DateTime<Utc>) {
        let (provider_ceilings, global_ceilings, threshold_pct) = {
            let config = self.read_config();
            (
                // Ceilings by provider name, for alert evaluation only.
                config
                    .providers
                    .iter()
                    .map(|p| (p.name.clone(), p.ceilings))
                    .collect::<HashMap<String, CeilingSet>>(),
                config.budget.global,
                config.budget.alert_threshold_pct,
            )
        };

        let mut fired = Vec::new();
        {
            let mut book = self.lock_book();
            let Some(reservation) = book.reservations.remove(&token.id) else {
                warn!(token = token.id, "Commit for unknown reservation");
                return;
            };

            let provider_name = reservation.provider.clone();
            let provider_alert_ceilings = provider_ceilings
                .get(&provider_name)
                .copied()
                .unwrap_or_default();

            if let Some(provider_set) = book.providers.get_mut(&provider_name) {
                for kind in WindowKind::ALL {
                    let window = provider_set.get_mut(kind);
                    window.roll(kind, now);
                    // A reservation that straddled a rollover was zeroed
                    // with its window.
                    window.reserved = (window.reserved - reservation.amount).max(0.0);
                    let before = window.spent;
                    window.spent += actual;
                    if let Some(alert) = threshold_crossing(
                        BudgetScope::Provider(provider_name.clone()),
                        kind,
                        before,
                        window.spent,
                        provider_alert_ceilings.get(kind),
                        threshold_pct,
                    ) {
                        fired.push(alert);
                    }
                }
            }

            for kind in WindowKind::ALL {
                let window = book.global.get_mut(kind);
                window.roll(kind, now);
                window.reserved = (window.reserved - reservation.amount).max(0.0);
                let before = window.spent;
                window.spent += actual;
                if let Some(alert) = threshold_crossing(
                    BudgetScope::Global,
                    kind,
                    before,
                    window.spent,
                    global_ceilings.get(kind),
                    threshold_pct,
                ) {
                    fired.push(alert);
                }
            }

            debug!(provider = %provider_name, actual, token = token.id, "Budget committed");
        }

        for alert in fired {
            info!(
                scope = %alert.scope,
                window = alert.window.as_str(),
                spent = alert.spent,
                ceiling = alert.ceiling,
                "Budget alert threshold crossed"
            );
            // No subscribers is fine.
            let _ = self.alerts.send(alert);
        }
    }

    /// Fully refund a reservation (the call never billed).
    pub fn release(&self, token: ReservationToken) {
        self.release_at(token, Utc::now());
    }

    fn release_at(&self, token: ReservationToken, now: DateTime<Utc>) {
        let mut book = self.lock_book();
        let Some(reservation) = book.reservations.remove(&token.id) else {
            warn!(token = token.id, "Release for unknown reservation");
            return;
        };

        if let Some(provider_set) = book.providers.get_mut(&reservation.provider) {
            for kind in WindowKind::ALL {
                let window = provider_set.get_mut(kind);
                window.roll(kind, now);
                window.reserved = (window.reserved - reservation.amount).max(0.0);
            }
        }
        for kind in WindowKind::ALL {
            let window = book.global.get_mut(kind);
            window.roll(kind, now);
            window.reserved = (window.reserved - reservation.amount).max(0.0);
        }

        debug!(provider = %reservation.provider, token = token.id, "Budget released");
    }

    /// Accumulated spend in a window: one provider's, or global when
    /// `provider` is `None`. Used by status/reporting surfaces.
    pub fn spent(&self, provider: Option<&str>, window: WindowKind) -> f64 {
        self.spent_at(provider, window, Utc::now())
    }

    fn spent_at(&self, provider: Option<&str>, window: WindowKind, now: DateTime<Utc>) -> f64 {
        let mut book = self.lock_book();
        match provider {
            Some(name) => match book.providers.get_mut(name) {
                Some(set) => {
                    let w = set.get_mut(window);
                    w.roll(window, now);
                    w.spent
                }
                None => 0.0,
            },
            None => {
                let w = book.global.get_mut(window);
                w.roll(window, now);
                w.spent
            }
        }
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_config(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, oxigate_core::config::OxigateConfig> {
        self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn threshold_crossing(
    scope: BudgetScope,
    window: WindowKind,
    before: f64,
    after: f64,
    ceiling: Option<f64>,
    threshold_pct: f64,
) -> Option<BudgetAlert> {
    let ceiling = ceiling?;
    let threshold = ceiling * threshold_pct / 100.0;
    if before < threshold && after >= threshold {
        Some(BudgetAlert {
            scope,
            window,
            spent: after,
            ceiling,
        })
    } else {
        None
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
