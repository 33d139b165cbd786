//! # Command Console
//!
//! Line-oriented operator console. Each line is `name` or `name:argument`.
//!
//! ## Commands
//! ```text
//! ┌──────────────────────────────┬──────────────┬──────────────────────────────┐
//! │ Command                      │ Profile      │ Effect                       │
//! ├──────────────────────────────┼──────────────┼──────────────────────────────┤
//! │ hammer / stop                │ HammerPos    │ start / stop the stress run  │
//! │ min_gap:<s> / max_gap:<s>    │ HammerPos    │ gap bounds in seconds        │
//! │ stats                        │ HammerPos    │ print run statistics         │
//! │ pizza[:flavour] / yuck       │ PizzaPos     │ purchase / refund $10.00     │
//! │ settle                       │ both         │ initiate settlement          │
//! │ pos_id:<id>                  │ both         │ set POS id (unpaired only)   │
//! │ eftpos_address:<addr>        │ both         │ set terminal address         │
//! │ pair / pair_cancel /         │ both         │ pairing pass-through         │
//! │ pair_confirm / unpair        │              │                              │
//! │ tx_sign_accept /             │ both         │ transaction pass-through     │
//! │ tx_sign_decline / tx_cancel  │              │                              │
//! │ ok                           │ both         │ acknowledge finished flow    │
//! │ status                       │ both         │ reprint                      │
//! │ bye                          │ both         │ exit                         │
//! └──────────────────────────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! A line that is not a command, or a command the running console does not
//! offer, prints a message and changes nothing.

use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hammer_core::SecretsAction;
use hammer_harness::{HarnessError, ProjectionEmitter, RenderReason, RunPhase, Session, StressDriver};

use crate::error::{ConsoleError, ConsoleResult, ErrorCode};
use crate::render;

// =============================================================================
// Profiles & Commands
// =============================================================================

/// Which console is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Stress harness.
    Hammer,
    /// Manual purchase, refund and settlement.
    Pizza,
}

impl Profile {
    pub fn app_name(&self) -> &'static str {
        match self {
            Profile::Hammer => "HammerPos",
            Profile::Pizza => "PizzaPos",
        }
    }

    pub fn bin_name(&self) -> &'static str {
        match self {
            Profile::Hammer => "hammer-pos",
            Profile::Pizza => "pizza-pos",
        }
    }

    pub fn about(&self) -> &'static str {
        match self {
            Profile::Hammer => "Stress-tests a payment terminal with back-to-back purchases",
            Profile::Pizza => "Point of sale console: charge for pizzas, refund, settle",
        }
    }

    pub fn example_pos_id(&self) -> &'static str {
        match self {
            Profile::Hammer => "HAMMERPOS",
            Profile::Pizza => "CITYPIZZA1",
        }
    }

    fn offers(&self, name: &str) -> bool {
        match name {
            "hammer" | "stop" | "min_gap" | "max_gap" | "stats" => *self == Profile::Hammer,
            "pizza" | "yuck" => *self == Profile::Pizza,
            _ => true,
        }
    }
}

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hammer,
    Stop,
    MinGap(String),
    MaxGap(String),
    Stats,
    Pizza(Option<String>),
    Yuck,
    Settle,
    PosId(String),
    EftposAddress(String),
    Pair,
    PairCancel,
    PairConfirm,
    Unpair,
    SignAccept,
    SignDecline,
    TxCancel,
    Ok,
    Status,
    Bye,
}

/// Parses one line. Blank lines yield `None`.
pub fn parse(line: &str, profile: Profile) -> ConsoleResult<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, arg) = match line.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (line, None),
    };

    let required = |example: &str| {
        arg.map(str::to_string)
            .ok_or_else(|| ConsoleError::missing_argument(name, example))
    };

    let command = match name {
        "hammer" => Command::Hammer,
        "stop" => Command::Stop,
        "min_gap" => Command::MinGap(String::new()),
        "max_gap" => Command::MaxGap(String::new()),
        "stats" => Command::Stats,
        "pizza" => Command::Pizza(arg.map(str::to_string)),
        "yuck" => Command::Yuck,
        "settle" => Command::Settle,
        "pos_id" => Command::PosId(String::new()),
        "eftpos_address" => Command::EftposAddress(String::new()),
        "pair" => Command::Pair,
        "pair_cancel" => Command::PairCancel,
        "pair_confirm" => Command::PairConfirm,
        "unpair" => Command::Unpair,
        "tx_sign_accept" => Command::SignAccept,
        "tx_sign_decline" => Command::SignDecline,
        "tx_cancel" => Command::TxCancel,
        "ok" => Command::Ok,
        "status" => Command::Status,
        "bye" => Command::Bye,
        _ => return Err(ConsoleError::unknown_command()),
    };

    if !profile.offers(name) {
        return Err(ConsoleError::not_available(name, profile));
    }

    let command = match command {
        Command::MinGap(_) => Command::MinGap(required("10")?),
        Command::MaxGap(_) => Command::MaxGap(required("20")?),
        Command::PosId(_) => Command::PosId(required(profile.example_pos_id())?),
        Command::EftposAddress(_) => Command::EftposAddress(required("10.161.104.104")?),
        other => other,
    };

    Ok(Some(command))
}

// =============================================================================
// Emitter
// =============================================================================

/// What the console loop reacts to besides operator input.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    Render(RenderReason),
    Secrets(SecretsAction),
    /// A stress purchase cycle finished; the run goes on.
    CycleFinished,
    /// A stress run reached Idle, stopped or cut short.
    RunFinished,
}

/// Forwards projector side effects to the console loop, which owns stdout.
pub struct ConsoleEmitter {
    tx: mpsc::UnboundedSender<ConsoleEvent>,
}

impl ConsoleEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ConsoleEvent>) -> Self {
        ConsoleEmitter { tx }
    }
}

impl ProjectionEmitter for ConsoleEmitter {
    fn emit_render(&self, reason: RenderReason) {
        if self.tx.send(ConsoleEvent::Render(reason)).is_err() {
            debug!("Console loop gone, dropping render");
        }
    }

    fn emit_secrets(&self, action: &SecretsAction) {
        if self.tx.send(ConsoleEvent::Secrets(action.clone())).is_err() {
            debug!("Console loop gone, dropping secrets notice");
        }
    }
}

// =============================================================================
// Console
// =============================================================================

/// Whether the loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The dispatcher, writing to `out`.
pub struct Console<W: Write> {
    profile: Profile,
    session: Session,
    out: W,
    clear_screen: bool,
}

impl<W: Write> Console<W> {
    pub fn new(
        profile: Profile,
        session: Session,
        out: W,
        events: mpsc::UnboundedSender<ConsoleEvent>,
        clear_screen: bool,
    ) -> Self {
        watch_driver(session.driver(), events);
        Console {
            profile,
            session,
            out,
            clear_screen,
        }
    }

    pub async fn welcome(&mut self) -> ConsoleResult<()> {
        self.clear()?;
        writeln!(self.out, "# Welcome to {} !", self.profile.app_name())?;
        self.screen().await?;
        render::prompt(&mut self.out)?;
        Ok(())
    }

    /// Handles one operator line. Only output failures are returned as
    /// errors; everything else is printed.
    pub async fn handle_line(&mut self, line: &str) -> ConsoleResult<Flow> {
        let result = match parse(line, self.profile) {
            Ok(Some(command)) => self.dispatch(command).await,
            Ok(None) => Ok(Flow::Continue),
            Err(e) => Err(e),
        };

        let flow = match result {
            Ok(flow) => flow,
            Err(e) if e.code == ErrorCode::Io => return Err(e),
            Err(e) => {
                debug!(code = ?e.code, "Command failed: {}", e.message);
                writeln!(self.out, "# {}", e.message)?;
                Flow::Continue
            }
        };

        if flow == Flow::Continue {
            render::prompt(&mut self.out)?;
        }
        Ok(flow)
    }

    async fn dispatch(&mut self, command: Command) -> ConsoleResult<Flow> {
        debug!(command = ?command, "Dispatching");
        match command {
            Command::Hammer => {
                if self.session.start_hammer().await {
                    writeln!(self.out, "Starting Hammering.")?;
                } else {
                    writeln!(self.out, "Already Hammering.")?;
                }
                self.screen().await?;
            }
            Command::Stop => {
                if self.session.stop_hammer().await {
                    writeln!(self.out, "Stopping Hammering.")?;
                } else {
                    writeln!(self.out, "# Not Hammering.")?;
                }
            }
            Command::MinGap(raw) => {
                self.session.set_min_gap(&raw).await?;
                self.screen().await?;
            }
            Command::MaxGap(raw) => {
                self.session.set_max_gap(&raw).await?;
                self.screen().await?;
            }
            Command::Stats => {
                let stats = self.session.stats().await;
                render::write_stats(&mut self.out, &stats)?;
            }
            Command::Pizza(flavour) => {
                let result = self.session.purchase().await;
                if let Ok(id) = &result {
                    info!(request_id = %id, flavour = flavour.as_deref().unwrap_or("margherita"), "Pizza ordered");
                }
                self.report_initiate(result, "purchase")?;
            }
            Command::Yuck => {
                let result = self.session.refund().await;
                self.report_initiate(result, "refund")?;
            }
            Command::Settle => {
                let result = self.session.settle().await;
                self.report_initiate(result, "settlement")?;
            }
            Command::PosId(raw) => {
                self.clear()?;
                match self.session.set_pos_id(&raw).await {
                    Ok(pos_id) => writeln!(self.out, "## -> POS ID now set to {}", pos_id)?,
                    Err(e) if e.is_operator_error() => {
                        let reason = ConsoleError::from(e).message;
                        writeln!(self.out, "## -> Could not set POS ID ({})", reason)?
                    }
                    Err(e) => return Err(e.into()),
                }
                self.screen().await?;
            }
            Command::EftposAddress(raw) => {
                self.clear()?;
                match self.session.set_terminal_address(&raw).await {
                    Ok(address) => writeln!(self.out, "## -> Eftpos Address now set to {}", address)?,
                    Err(e) if e.is_operator_error() => {
                        let reason = ConsoleError::from(e).message;
                        writeln!(self.out, "## -> Could not set Eftpos Address ({})", reason)?
                    }
                    Err(e) => return Err(e.into()),
                }
                self.screen().await?;
            }
            Command::Pair => self.session.pair().await?,
            Command::PairCancel => self.session.pair_cancel().await,
            Command::PairConfirm => self.session.pair_confirm().await,
            Command::Unpair => self.session.unpair().await?,
            Command::SignAccept => self.session.accept_signature(true).await,
            Command::SignDecline => self.session.accept_signature(false).await,
            Command::TxCancel => self.session.cancel_transaction().await,
            Command::Ok => {
                self.clear()?;
                if !self.session.ack().await {
                    debug!("Flow not finished, nothing acknowledged");
                }
                self.screen().await?;
            }
            Command::Status => {
                self.clear()?;
                self.screen().await?;
            }
            Command::Bye => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    fn report_initiate(&mut self, result: Result<String, HarnessError>, what: &str) -> ConsoleResult<()> {
        match result {
            Ok(_) => Ok(()),
            Err(HarnessError::Rejected { message }) => {
                writeln!(self.out, "# Could not initiate {}: {}. Please Retry.", what, message)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reacts to a projector side effect or a drained run.
    pub async fn on_event(&mut self, event: ConsoleEvent) -> ConsoleResult<()> {
        match event {
            ConsoleEvent::Render(reason) => {
                self.clear()?;
                if reason == RenderReason::Status {
                    let status = self.session.render_snapshot().await.status;
                    writeln!(self.out, "# --> SPI Status Changed: {}", status)?;
                }
                self.screen().await?;
            }
            ConsoleEvent::Secrets(SecretsAction::Persist(secrets)) => {
                writeln!(
                    self.out,
                    "# I Have Secrets: {}{}. Persist them Securely.",
                    secrets.enc_key, secrets.hmac_key
                )?;
            }
            ConsoleEvent::Secrets(SecretsAction::Destroy) => {
                writeln!(
                    self.out,
                    "# I Have Lost the Secrets, i.e. Unpaired. Destroy the persisted secrets."
                )?;
            }
            ConsoleEvent::CycleFinished => {
                let stats = self.session.stats().await;
                render::write_stats(&mut self.out, &stats)?;
            }
            ConsoleEvent::RunFinished => {
                writeln!(self.out, "Stopped Hammering.")?;
                let stats = self.session.stats().await;
                render::write_stats(&mut self.out, &stats)?;
                let status = self.session.driver().status();
                if let Some(error) = status.last_error {
                    warn!(error = %error, "Stress run ended early");
                    writeln!(self.out, "# Hammering ended early: {}", error)?;
                }
                if status.check_terminal {
                    writeln!(self.out, "# Check the terminal for the real outcome of the last purchase.")?;
                }
            }
        }
        render::prompt(&mut self.out)?;
        Ok(())
    }

    /// Says goodbye, drains the session and prints the persisted line.
    pub async fn finish(mut self) -> ConsoleResult<W> {
        writeln!(self.out, "# BaBye!")?;
        if let Some(persisted) = self.session.shutdown().await? {
            writeln!(self.out, "{}", persisted)?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    async fn screen(&mut self) -> ConsoleResult<()> {
        let snap = self.session.render_snapshot().await;
        render::write_screen(&mut self.out, &snap, self.profile)?;
        Ok(())
    }

    fn clear(&mut self) -> ConsoleResult<()> {
        if self.clear_screen {
            render::clear(&mut self.out)?;
        }
        Ok(())
    }
}

/// Turns driver status changes into console events until the driver is
/// dropped.
fn watch_driver(driver: &StressDriver, events: mpsc::UnboundedSender<ConsoleEvent>) {
    let mut status = driver.subscribe();
    tokio::spawn(async move {
        let mut last = status.borrow_and_update().clone();
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            let event = if current.completed_runs != last.completed_runs {
                Some(ConsoleEvent::RunFinished)
            } else if current.cycles != last.cycles && current.phase == RunPhase::Running {
                Some(ConsoleEvent::CycleFinished)
            } else {
                None
            };
            last = current;

            if let Some(event) = event {
                if events.send(event).is_err() {
                    break;
                }
            }
        }
        debug!("Driver watch ended");
    });
}

/// Builds the emitter and event channel a console session runs on.
pub fn console_channel() -> (
    Arc<ConsoleEmitter>,
    mpsc::UnboundedSender<ConsoleEvent>,
    mpsc::UnboundedReceiver<ConsoleEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ConsoleEmitter::new(tx.clone())), tx, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hammer_core::{PersistedSession, SuccessState};
    use hammer_harness::{HarnessConfig, NoOpEmitter, SimulatedTerminal};
    use std::time::Duration;
    use tokio::time::sleep;

    #[test]
    fn test_parse_commands() {
        let hammer = Profile::Hammer;
        assert_eq!(parse("hammer", hammer).unwrap(), Some(Command::Hammer));
        assert_eq!(parse("  stop  ", hammer).unwrap(), Some(Command::Stop));
        assert_eq!(parse("min_gap:5", hammer).unwrap(), Some(Command::MinGap("5".into())));
        assert_eq!(parse("max_gap: 30", hammer).unwrap(), Some(Command::MaxGap("30".into())));
        assert_eq!(
            parse("pos_id:HAMMERPOS", hammer).unwrap(),
            Some(Command::PosId("HAMMERPOS".into()))
        );
        assert_eq!(
            parse("eftpos_address:10.161.104.104", hammer).unwrap(),
            Some(Command::EftposAddress("10.161.104.104".into()))
        );
        assert_eq!(parse("tx_sign_decline", hammer).unwrap(), Some(Command::SignDecline));
        assert_eq!(parse("settle", hammer).unwrap(), Some(Command::Settle));
        assert_eq!(parse("ok", hammer).unwrap(), Some(Command::Ok));
        assert_eq!(parse("", hammer).unwrap(), None);

        let pizza = Profile::Pizza;
        assert_eq!(parse("pizza", pizza).unwrap(), Some(Command::Pizza(None)));
        assert_eq!(
            parse("pizza:funghi", pizza).unwrap(),
            Some(Command::Pizza(Some("funghi".into())))
        );
        assert_eq!(parse("yuck", pizza).unwrap(), Some(Command::Yuck));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let err = parse("launch_rockets", Profile::Hammer).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownCommand);
        assert_eq!(err.message, "I don't understand. Sorry.");

        let err = parse("min_gap", Profile::Hammer).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
        let err = parse("pos_id:", Profile::Hammer).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
    }

    #[test]
    fn test_profile_gating() {
        assert_eq!(parse("pizza", Profile::Hammer).unwrap_err().code, ErrorCode::NotAvailable);
        assert_eq!(parse("hammer", Profile::Pizza).unwrap_err().code, ErrorCode::NotAvailable);
        // Gating wins over a missing argument.
        assert_eq!(parse("min_gap", Profile::Pizza).unwrap_err().code, ErrorCode::NotAvailable);
        assert!(parse("pair", Profile::Pizza).is_ok());
    }

    async fn console(profile: Profile) -> Console<Vec<u8>> {
        let mut config = HarnessConfig::default();
        config.terminal.pos_id = "HAMMERPOS".into();
        config.terminal.eftpos_address = "10.161.104.104".into();
        let (session, _) = Session::simulated(&config, None, Arc::new(NoOpEmitter)).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        Console::new(profile, session, Vec::new(), tx, false)
    }

    /// A paired hammer console whose driver gives up after five seconds.
    async fn paired_hammer() -> (
        Console<Vec<u8>>,
        SimulatedTerminal,
        mpsc::UnboundedReceiver<ConsoleEvent>,
    ) {
        let mut config = HarnessConfig::default();
        config.hammer.min_gap_ms = 1000;
        config.hammer.max_gap_ms = 1000;
        config.hammer.completion_timeout_secs = 5;
        config.simulator.connect_latency_ms = 10;
        config.simulator.tx_latency_ms = 500;
        config.simulator.seed = Some(4);
        let persisted = PersistedSession::parse("HAMMERPOS:10.161.104.104:ENC:HMAC").unwrap();

        let (session, sim) = Session::simulated(&config, Some(persisted), Arc::new(NoOpEmitter)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let console = Console::new(Profile::Hammer, session, Vec::new(), tx, false);
        sleep(Duration::from_millis(50)).await;
        (console, sim, rx)
    }

    fn text(console: &Console<Vec<u8>>) -> String {
        String::from_utf8_lossy(&console.out).into_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_input_changes_nothing() {
        let mut console = console(Profile::Hammer).await;
        let before = console.session.render_snapshot().await;

        assert_eq!(console.handle_line("fly").await.unwrap(), Flow::Continue);
        assert!(text(&console).contains("# I don't understand. Sorry."));

        let after = console.session.render_snapshot().await;
        assert_eq!(before.state, after.state);
        assert_eq!(before.gap, after.gap);
        console.finish().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_gap_keeps_previous_value() {
        let mut console = console(Profile::Hammer).await;

        console.handle_line("min_gap:soon").await.unwrap();
        console.handle_line("max_gap:0").await.unwrap();
        assert_eq!(console.session.gap().await.min_ms(), 10_000);
        assert_eq!(console.session.gap().await.max_ms(), 20_000);

        console.handle_line("min_gap:4").await.unwrap();
        assert_eq!(console.session.gap().await.min_ms(), 4_000);
        assert!(text(&console).contains("# Min Gap:4  Max Gap: 20 #"));
        console.finish().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_run_is_reported_without_stop() {
        let (mut console, sim, mut events) = paired_hammer().await;
        sim.stall_next(1);

        console.handle_line("hammer").await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConsoleEvent::RunFinished));
        console.on_event(event).await.unwrap();

        let out = text(&console);
        assert!(out.contains("Stopped Hammering."));
        assert!(out.contains("# Hammering ended early: Transaction prchs-"));
        assert!(out.contains("did not finish within 5s"));
        assert!(out.contains("# Check the terminal for the real outcome of the last purchase."));
        assert!(out.contains("Unknowns 1\n"));

        console.handle_line("stop").await.unwrap();
        assert!(text(&console).contains("# Not Hammering."));
        console.handle_line("status").await.unwrap();
        assert!(text(&console).contains("# Last Run Ended Early: Transaction prchs-"));
        console.finish().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_after_each_cycle_and_on_stop() {
        let (mut console, sim, mut events) = paired_hammer().await;
        sim.script_outcomes([SuccessState::Success, SuccessState::Success]);

        console.handle_line("hammer").await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConsoleEvent::CycleFinished));
        console.on_event(event).await.unwrap();
        assert!(text(&console).contains("Attempts 1\n"));
        assert!(text(&console).contains("Successes 1\n"));

        console.handle_line("stop").await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ConsoleEvent::RunFinished));
        console.on_event(event).await.unwrap();

        let out = text(&console);
        assert!(out.contains("Stopping Hammering."));
        assert!(out.contains("Stopped Hammering."));
        assert!(!out.contains("ended early"));
        console.finish().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pizza_console_rejects_purchase_while_unpaired() {
        let mut console = console(Profile::Pizza).await;

        console.handle_line("pizza:funghi").await.unwrap();
        assert!(text(&console).contains("# Could not initiate purchase: Not Paired. Please Retry."));

        console.handle_line("pos_id:CITYPIZZA1").await.unwrap();
        assert!(text(&console).contains("## -> POS ID now set to CITYPIZZA1"));

        assert_eq!(console.handle_line("bye").await.unwrap(), Flow::Exit);
        let out = String::from_utf8(console.finish().await.unwrap()).unwrap();
        assert!(out.trim_end().ends_with("# BaBye!"));
    }
}
