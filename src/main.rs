mod api_client;
mod cache;
mod config;
mod reconcile;
mod rule_form;
mod rules;
mod types;
mod util;
mod view;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};

use api_client::{ApiError, RuleServiceClient, SetRulesRequest};
use cache::PositionCache;
use reconcile::Plan;
use rule_form::{DraftField, RuleForm};
use rules::SubmitAction;
use types::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MutationKind {
    SaveRules,
    ClearRules,
    RemoveAll,
    RemoveOne,
    Close,
}

enum Event {
    BtcPrice(f64),
    Poll {
        seq: u64,
        outcome: Result<Vec<Position>, ApiError>,
    },
    Mutation {
        kind: MutationKind,
        symbol: String,
        outcome: Result<(), ApiError>,
    },
}

/// A destructive action waiting for the user's y/N answer on the next line.
enum Pending {
    RemoveAllRules { symbol: String },
    RemoveRule { symbol: String, index: usize },
    ClosePosition { symbol: String, category: String },
    /// Saving a form that built zero valid rules: intentional clear-all.
    ClearRules { symbol: String },
}

/// All client state, owned by the event loop for the process lifetime.
struct App {
    client: RuleServiceClient,
    cache: PositionCache,
    category: String,
    btc_price: f64,
    poll_active: bool,
    error_state: Option<String>,
    form: Option<RuleForm>,
    /// Grid changed while a form was open; re-render once it closes.
    needs_render: bool,
    pending: Option<Pending>,
    mutation_in_flight: bool,
    /// Monotonic fetch counter. A poll response whose seq is not newer than
    /// the last applied one is stale and must never overwrite the cache.
    poll_seq: u64,
    applied_seq: u64,
}

impl App {
    fn new(client: RuleServiceClient) -> Self {
        App {
            client,
            cache: PositionCache::new(),
            category: config::DEFAULT_CATEGORY.to_string(),
            btc_price: 0.0,
            poll_active: true,
            error_state: None,
            form: None,
            needs_render: false,
            pending: None,
            mutation_in_flight: false,
            poll_seq: 0,
            applied_seq: 0,
        }
    }

    fn request_poll(&mut self, tx: &UnboundedSender<Event>) {
        self.poll_seq += 1;
        let seq = self.poll_seq;
        let client = self.client.clone();
        let category = self.category.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = client.fetch_positions(&category).await;
            let _ = tx.send(Event::Poll { seq, outcome });
        });
    }

    fn handle_event(&mut self, event: Event, tx: &UnboundedSender<Event>) {
        match event {
            Event::BtcPrice(price) => {
                self.btc_price = price;
                log::debug!("BTC ${:.0}", price);
            }
            Event::Poll { seq, outcome } => self.apply_poll(seq, outcome),
            Event::Mutation {
                kind,
                symbol,
                outcome,
            } => self.finish_mutation(kind, symbol, outcome, tx),
        }
    }

    fn apply_poll(&mut self, seq: u64, outcome: Result<Vec<Position>, ApiError>) {
        if seq <= self.applied_seq {
            log::debug!(
                "Stale poll response discarded (seq {} <= {})",
                seq,
                self.applied_seq
            );
            return;
        }
        match outcome {
            Ok(new_positions) => {
                self.applied_seq = seq;
                self.error_state = None;
                let plan = reconcile::reconcile(self.cache.positions(), &new_positions);
                self.cache.replace(new_positions);

                if self.form.is_some() {
                    // The editing surface owns the terminal; never render the
                    // grid out from under it. Catch up after it closes.
                    let changed = match &plan {
                        Plan::FullRerender => true,
                        Plan::FieldPatch(patches) => patches
                            .iter()
                            .any(|p| p.deltas.iter().any(|d| d.changed())),
                    };
                    if changed {
                        self.needs_render = true;
                    }
                } else {
                    match plan {
                        Plan::FullRerender => {
                            log::info!("Structural change — re-rendering positions");
                            view::render_positions(self.cache.positions(), self.btc_price);
                        }
                        Plan::FieldPatch(patches) => view::apply_patch(&patches),
                    }
                }

                if self.cache.is_empty() && self.poll_active {
                    self.poll_active = false;
                    log::info!("No open positions — polling paused");
                    if self.form.is_none() {
                        view::render_empty_state();
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Position poll failed: {}", message);
                self.poll_active = false;
                view::render_error_state(&message);
                self.error_state = Some(message);
            }
        }
    }

    fn finish_mutation(
        &mut self,
        kind: MutationKind,
        symbol: String,
        outcome: Result<(), ApiError>,
        tx: &UnboundedSender<Event>,
    ) {
        self.mutation_in_flight = false;
        match outcome {
            Ok(()) => {
                match kind {
                    MutationKind::SaveRules => {
                        self.form = None;
                        println!("✓ BTC rules applied for {}", symbol);
                    }
                    MutationKind::ClearRules => {
                        self.form = None;
                        println!("✓ BTC rules removed for {}", symbol);
                    }
                    MutationKind::RemoveAll => println!("✓ BTC rules removed for {}", symbol),
                    MutationKind::RemoveOne => println!("✓ Rule removed for {}", symbol),
                    MutationKind::Close => println!("✓ Position closed: {}", symbol),
                }
                // resync immediately instead of waiting for the next tick
                self.error_state = None;
                self.poll_active = true;
                self.request_poll(tx);
            }
            Err(e) => {
                if let Some(form) = self.form.as_mut() {
                    form.submitting = false;
                }
                let action = match kind {
                    MutationKind::SaveRules => "apply rules",
                    MutationKind::ClearRules | MutationKind::RemoveAll => "remove rules",
                    MutationKind::RemoveOne => "remove rule",
                    MutationKind::Close => "close position",
                };
                log::error!("{} failed for {}: {}", action, symbol, e);
                println!("✗ Failed to {} for {}: {}", action, symbol, e);
            }
        }
    }

    /// Returns false when the user asked to quit.
    fn handle_command(&mut self, input: &str, tx: &UnboundedSender<Event>) -> bool {
        if input.is_empty() {
            return true;
        }
        if let Some(pending) = self.pending.take() {
            if matches!(input, "y" | "Y" | "yes" | "YES") {
                self.execute_pending(pending, tx);
            } else {
                println!("Cancelled.");
            }
            return true;
        }
        if self.form.is_some() {
            self.handle_form_command(input, tx);
            return true;
        }

        let tokens: Vec<&str> = input.split_whitespace().collect();
        match tokens[0] {
            "help" => view::print_grid_help(),
            "quit" | "exit" => return false,
            "refresh" => {
                self.error_state = None;
                self.poll_active = true;
                self.request_poll(tx);
                println!("Refreshing…");
            }
            "list" => view::render_positions(self.cache.positions(), self.btc_price),
            "category" => match tokens.get(1) {
                Some(c) if ["all", "linear", "spot"].contains(c) => {
                    self.category = c.to_string();
                    self.error_state = None;
                    self.poll_active = true;
                    self.request_poll(tx);
                    println!("Category: {}", c);
                }
                _ => println!("usage: category all|linear|spot"),
            },
            "show" => match tokens.get(1) {
                Some(symbol) => match self.cache.find(symbol) {
                    Some(position) => view::render_detail(position, self.btc_price),
                    None => println!("No position found for {}", symbol),
                },
                None => println!("usage: show <symbol>"),
            },
            "rules" => match tokens.get(1) {
                Some(symbol) => match self.cache.find(symbol) {
                    Some(position) => {
                        let form = RuleForm::for_position(position);
                        view::render_form(&form, self.btc_price);
                        self.form = Some(form);
                    }
                    None => println!("No position found for {}", symbol),
                },
                None => println!("usage: rules <symbol>"),
            },
            "unrule" => match tokens.get(1) {
                Some(symbol) if self.cache.find(symbol).is_some() => {
                    println!("Remove all BTC rules for {}? [y/N]", symbol);
                    self.pending = Some(Pending::RemoveAllRules {
                        symbol: symbol.to_string(),
                    });
                }
                Some(symbol) => println!("No position found for {}", symbol),
                None => println!("usage: unrule <symbol>"),
            },
            "rm" => {
                let symbol = tokens.get(1);
                let index = tokens.get(2).and_then(|t| t.parse::<usize>().ok());
                match (symbol, index) {
                    (Some(symbol), Some(index)) => {
                        match self
                            .cache
                            .find(symbol)
                            .and_then(|p| p.monitor.as_ref())
                            .and_then(|m| m.rules.get(index))
                        {
                            Some(rule) => {
                                println!("Remove this rule?\n  {}\n[y/N]", rule.describe());
                                self.pending = Some(Pending::RemoveRule {
                                    symbol: symbol.to_string(),
                                    index,
                                });
                            }
                            None => println!("No such rule for {}", symbol),
                        }
                    }
                    _ => println!("usage: rm <symbol> <index>"),
                }
            }
            "close" => match tokens.get(1) {
                Some(symbol) => match self.cache.find(symbol) {
                    Some(position) => {
                        println!("Close your {} position? [y/N]", symbol);
                        self.pending = Some(Pending::ClosePosition {
                            symbol: symbol.to_string(),
                            category: position.category().to_string(),
                        });
                    }
                    None => println!("No position found for {}", symbol),
                },
                None => println!("usage: close <symbol>"),
            },
            _ => println!("Unknown command (`help` lists them)"),
        }
        true
    }

    fn execute_pending(&mut self, pending: Pending, tx: &UnboundedSender<Event>) {
        if self.mutation_in_flight {
            println!("Another request is still in flight.");
            return;
        }
        match pending {
            Pending::RemoveAllRules { symbol } => {
                self.spawn_remove_all(MutationKind::RemoveAll, symbol, tx)
            }
            Pending::ClearRules { symbol } => {
                self.spawn_remove_all(MutationKind::ClearRules, symbol, tx)
            }
            Pending::ClosePosition { symbol, category } => {
                self.mutation_in_flight = true;
                let client = self.client.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = client.close_position(&symbol, &category).await;
                    let _ = tx.send(Event::Mutation {
                        kind: MutationKind::Close,
                        symbol,
                        outcome,
                    });
                });
            }
            Pending::RemoveRule { symbol, index } => {
                // Re-resolve against the current cache: the rule set may have
                // shifted while the prompt was open.
                let Some(monitor) = self.cache.find(&symbol).and_then(|p| p.monitor.clone())
                else {
                    println!("No rules found for {}", symbol);
                    return;
                };
                match rules::remaining_after_removal(&monitor.rules, index) {
                    None => println!("Rule {} no longer exists for {}", index, symbol),
                    Some(SubmitAction::RemoveAll) => {
                        // last rule: remove the monitor, never submit an empty set
                        self.spawn_remove_all(MutationKind::RemoveOne, symbol, tx)
                    }
                    Some(SubmitAction::Resubmit(remaining)) => {
                        let request = SetRulesRequest {
                            symbol: symbol.clone(),
                            category: monitor.category.clone(),
                            side: monitor.side,
                            original_size: monitor.original_size,
                            rules: remaining,
                        };
                        self.spawn_submit(MutationKind::RemoveOne, request, tx);
                    }
                }
            }
        }
    }

    fn spawn_submit(
        &mut self,
        kind: MutationKind,
        request: SetRulesRequest,
        tx: &UnboundedSender<Event>,
    ) {
        self.mutation_in_flight = true;
        let client = self.client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let symbol = request.symbol.clone();
            let outcome = client.submit_rules(&request).await;
            let _ = tx.send(Event::Mutation {
                kind,
                symbol,
                outcome,
            });
        });
    }

    fn spawn_remove_all(&mut self, kind: MutationKind, symbol: String, tx: &UnboundedSender<Event>) {
        self.mutation_in_flight = true;
        let client = self.client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = client.remove_all_rules(&symbol).await;
            let _ = tx.send(Event::Mutation {
                kind,
                symbol,
                outcome,
            });
        });
    }

    fn handle_form_command(&mut self, input: &str, tx: &UnboundedSender<Event>) {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        match tokens[0] {
            "save" => {
                self.save_form(tx);
                return;
            }
            "cancel" => {
                self.form = None;
                println!("Draft discarded.");
                if self.needs_render {
                    self.needs_render = false;
                    view::render_positions(self.cache.positions(), self.btc_price);
                }
                return;
            }
            "help" => {
                view::print_form_help();
                return;
            }
            _ => {}
        }

        let Some(form) = self.form.as_mut() else {
            return;
        };
        let mut edited = true;
        match tokens[0] {
            "full" => match tokens.get(1) {
                Some(&"off") => form.full_close.enabled = false,
                Some(price) => {
                    form.full_close.enabled = true;
                    form.full_close.btc_price = price.to_string();
                }
                None => {
                    println!("usage: full <btc_price> | full off");
                    edited = false;
                }
            },
            "partial" => match tokens.get(1) {
                Some(&"add") => match (tokens.get(2), tokens.get(3)) {
                    (Some(btc), Some(pct)) => {
                        form.partial_closes.push_entry(btc.to_string(), pct.to_string())
                    }
                    _ => form.partial_closes.add(),
                },
                Some(&"set") => {
                    let index = tokens.get(2).and_then(|t| t.parse::<usize>().ok());
                    let field = match tokens.get(3) {
                        Some(&"btc") => Some(DraftField::BtcPrice),
                        Some(&"pct") => Some(DraftField::ClosePercent),
                        _ => None,
                    };
                    match (index, field, tokens.get(4)) {
                        (Some(index), Some(field), Some(value)) => {
                            form.partial_closes.update(index, field, value)
                        }
                        _ => {
                            println!("usage: partial set <index> btc|pct <value>");
                            edited = false;
                        }
                    }
                }
                Some(&"rm") => match tokens.get(2).and_then(|t| t.parse::<usize>().ok()) {
                    Some(index) => form.partial_closes.remove(index),
                    None => {
                        println!("usage: partial rm <index>");
                        edited = false;
                    }
                },
                _ => {
                    println!("usage: partial add [<btc> <pct>] | set <i> btc|pct <v> | rm <i>");
                    edited = false;
                }
            },
            "tp" => match tokens.get(1) {
                Some(&"off") => form.set_tp.enabled = false,
                Some(&"full") => match tokens.get(2) {
                    Some(&"on") => form.set_tp_full_close(true),
                    Some(&"off") => form.set_tp_full_close(false),
                    _ => {
                        println!("usage: tp full on|off");
                        edited = false;
                    }
                },
                Some(btc) => match tokens.get(2) {
                    Some(tp) => {
                        form.set_tp.enabled = true;
                        form.set_tp.btc_price = btc.to_string();
                        form.set_tp.tp_price = tp.to_string();
                        if let Some(pct) = tokens.get(3) {
                            form.set_tp_close_percent(pct);
                        }
                    }
                    None => {
                        println!("usage: tp <btc_price> <tp_price> [<percent>]");
                        edited = false;
                    }
                },
                None => {
                    println!("usage: tp <btc_price> <tp_price> [<percent>] | tp full on|off | tp off");
                    edited = false;
                }
            },
            "sl" => match tokens.get(1) {
                Some(&"off") => form.set_sl.enabled = false,
                Some(btc) => match tokens.get(2) {
                    Some(sl) => {
                        form.set_sl.enabled = true;
                        form.set_sl.btc_price = btc.to_string();
                        form.set_sl.sl_price = sl.to_string();
                    }
                    None => {
                        println!("usage: sl <btc_price> <sl_price> | sl off");
                        edited = false;
                    }
                },
                None => {
                    println!("usage: sl <btc_price> <sl_price> | sl off");
                    edited = false;
                }
            },
            "show" => {}
            _ => {
                println!("Unknown form command (`help` lists them)");
                edited = false;
            }
        }
        if edited {
            view::render_form(form, self.btc_price);
        }
    }

    fn save_form(&mut self, tx: &UnboundedSender<Event>) {
        let Some(form) = self.form.as_ref() else {
            return;
        };
        if form.submitting || self.mutation_in_flight {
            println!("Submission already in flight.");
            return;
        }
        let rules = form.build_rule_set();
        if rules.is_empty() {
            // Not an error: an empty set is an intentional clear-all, gated
            // behind the same confirmation as any other destructive action.
            println!(
                "No valid rules configured. Remove all BTC rules for {}? [y/N]",
                form.symbol
            );
            self.pending = Some(Pending::ClearRules {
                symbol: form.symbol.clone(),
            });
            return;
        }
        let request = SetRulesRequest {
            symbol: form.symbol.clone(),
            category: form.category.clone(),
            side: form.side,
            original_size: form.position_size,
            rules,
        };
        if let Some(form) = self.form.as_mut() {
            form.submitting = true;
        }
        println!("Applying BTC rules for {}…", request.symbol);
        self.spawn_submit(MutationKind::SaveRules, request, tx);
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let base_url = std::env::var("RULE_SERVICE_URL")
        .unwrap_or_else(|_| config::RULE_SERVICE_URL.to_string());
    let client = RuleServiceClient::new(&base_url);
    let mut app = App::new(client);

    println!("₿ BTC Rules — position monitor ({})", base_url);
    println!("Type `help` for commands.\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut price_timer =
        tokio::time::interval(Duration::from_secs(config::PRICE_INTERVAL_SECS));
    let mut poll_timer = tokio::time::interval(Duration::from_secs(config::POLL_INTERVAL_SECS));
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            _ = price_timer.tick() => {
                // best-effort: a failed tick just waits for the next one
                let client = app.client.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    match client.fetch_btc_price().await {
                        Ok(price) => { let _ = tx.send(Event::BtcPrice(price)); }
                        Err(e) => log::warn!("BTC price fetch failed: {}", e),
                    }
                });
            }
            _ = poll_timer.tick() => {
                if app.poll_active {
                    app.request_poll(&tx);
                }
            }
            Some(event) = rx.recv() => {
                app.handle_event(event, &tx);
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) => {
                        if !app.handle_command(input.trim(), &tx) {
                            break;
                        }
                    }
                    // stdin closed: keep polling headless is pointless, exit
                    _ => break,
                }
            }
        }
    }

    log::info!("Shutting down");
}
