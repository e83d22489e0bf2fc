use crate::types::Position;

/// The four fields a poll tick may update in place on a rendered card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    CurrentPrice,
    PositionValue,
    UnrealizedPnl,
    PnlPercentage,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::CurrentPrice => "current_price",
            Field::PositionValue => "position_value",
            Field::UnrealizedPnl => "unrealized_pnl",
            Field::PnlPercentage => "pnl_percentage",
        }
    }
}

/// How the new value should be rendered when the patch is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueFormat {
    /// Dollar amount, 2 decimals, up to `max_decimals` for small prices.
    Currency { max_decimals: usize },
    /// Dollar amount with an explicit +/- prefix.
    SignedCurrency,
    /// Percent with an explicit + prefix for non-negative values.
    SignedPercent,
}

/// Styling class for PnL-derived fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignClass {
    Positive,
    Negative,
}

impl SignClass {
    fn of(value: f64) -> SignClass {
        if value >= 0.0 {
            SignClass::Positive
        } else {
            SignClass::Negative
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDelta {
    pub field: Field,
    pub old: f64,
    pub new: f64,
    pub format: ValueFormat,
    pub sign: Option<SignClass>,
}

impl FieldDelta {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

/// In-place updates for one rendered card.
#[derive(Clone, Debug, PartialEq)]
pub struct CardPatch {
    pub symbol: String,
    pub deltas: Vec<FieldDelta>,
}

/// Outcome of diffing two snapshots. All-or-nothing: a single structural
/// change anywhere makes the whole batch a full re-render, patches are never
/// mixed with it.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    FullRerender,
    FieldPatch(Vec<CardPatch>),
}

/// Diff the cached snapshot against a freshly fetched one.
///
/// Structural changes (position appeared or disappeared, monitor attached or
/// detached, monitor state differing under deep equality) force a full
/// re-render. Everything else reduces to per-card field patches: a field is
/// included only when its value changed, EXCEPT the two PnL fields, which are
/// always included — their sign class can flip while the rounded value stays
/// put, and the flash highlight tracks them every tick.
pub fn reconcile(old: &[Position], new: &[Position]) -> Plan {
    if old.len() != new.len() {
        return Plan::FullRerender;
    }

    let mut patches = Vec::new();
    for new_pos in new {
        let Some(old_pos) = old.iter().find(|p| p.symbol == new_pos.symbol) else {
            // a position we have never rendered
            return Plan::FullRerender;
        };

        let had_monitor = old_pos.monitor.is_some();
        let has_monitor = new_pos.monitor.is_some();
        if had_monitor != has_monitor {
            return Plan::FullRerender;
        }
        if had_monitor && old_pos.monitor != new_pos.monitor {
            return Plan::FullRerender;
        }

        let deltas = field_deltas(old_pos, new_pos);
        patches.push(CardPatch {
            symbol: new_pos.symbol.clone(),
            deltas,
        });
    }

    Plan::FieldPatch(patches)
}

fn field_deltas(old: &Position, new: &Position) -> Vec<FieldDelta> {
    let mut deltas = Vec::new();

    if old.current_price != new.current_price {
        deltas.push(FieldDelta {
            field: Field::CurrentPrice,
            old: old.current_price,
            new: new.current_price,
            format: ValueFormat::Currency { max_decimals: 4 },
            sign: None,
        });
    }
    if old.position_value != new.position_value {
        deltas.push(FieldDelta {
            field: Field::PositionValue,
            old: old.position_value,
            new: new.position_value,
            format: ValueFormat::Currency { max_decimals: 2 },
            sign: None,
        });
    }
    // PnL fields are unconditional (see reconcile docs).
    deltas.push(FieldDelta {
        field: Field::UnrealizedPnl,
        old: old.unrealized_pnl,
        new: new.unrealized_pnl,
        format: ValueFormat::SignedCurrency,
        sign: Some(SignClass::of(new.unrealized_pnl)),
    });
    deltas.push(FieldDelta {
        field: Field::PnlPercentage,
        old: old.pnl_percentage,
        new: new.pnl_percentage,
        format: ValueFormat::SignedPercent,
        sign: Some(SignClass::of(new.pnl_percentage)),
    });

    deltas
}
