//! Console text for a session snapshot.

use serde_json::Value;
use std::io::{self, Write};
use std::time::Duration;

use hammer_core::{
    OutcomeKind, PairingFlowState, SpiFlow, SpiStatus, StatsSnapshot, SuccessState,
    TransactionFlowState, TransactionType,
};
use hammer_harness::SessionSnapshot;

use crate::console::Profile;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Flow details, available actions and the status block.
pub fn write_screen(out: &mut impl Write, snap: &SessionSnapshot, profile: Profile) -> io::Result<()> {
    write_flow_info(out, snap)?;
    write_actions(out, snap, profile)?;
    write_status(out, snap, profile)
}

pub fn clear(out: &mut impl Write) -> io::Result<()> {
    write!(out, "{}", CLEAR_SCREEN)
}

pub fn prompt(out: &mut impl Write) -> io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

// =============================================================================
// Flow
// =============================================================================

fn write_flow_info(out: &mut impl Write, snap: &SessionSnapshot) -> io::Result<()> {
    match snap.flow {
        SpiFlow::Pairing => write_pairing(out, &snap.pairing)?,
        SpiFlow::Transaction => write_transaction(out, &snap.tx)?,
        SpiFlow::Idle => {}
    }
    writeln!(out)
}

fn write_pairing(out: &mut impl Write, pairing: &PairingFlowState) -> io::Result<()> {
    writeln!(out, "### PAIRING PROCESS UPDATE ###")?;
    writeln!(out, "# {}", pairing.message)?;
    writeln!(out, "# Finished? {}", pairing.finished)?;
    writeln!(out, "# Successful? {}", pairing.successful)?;
    writeln!(out, "# Confirmation Code: {}", pairing.confirmation_code)?;
    writeln!(out, "# Waiting Confirm from Eftpos? {}", pairing.awaiting_check_from_eftpos)?;
    writeln!(out, "# Waiting Confirm from POS? {}", pairing.awaiting_check_from_pos)
}

fn write_transaction(out: &mut impl Write, tx: &TransactionFlowState) -> io::Result<()> {
    writeln!(out, "### TX PROCESS UPDATE ###")?;
    writeln!(out, "# {}", tx.display_message)?;
    writeln!(out, "# Id: {}", tx.id)?;
    writeln!(out, "# Type: {}", tx.tx_type)?;
    writeln!(out, "# Amount: {}", tx.amount())?;
    writeln!(out, "# Waiting For Signature: {}", tx.awaiting_signature_check)?;
    writeln!(out, "# Attempting to Cancel : {}", tx.attempting_to_cancel)?;
    writeln!(out, "# Finished: {}", tx.finished)?;
    writeln!(out, "# Success: {}", tx.success)?;

    if tx.finished {
        writeln!(out)?;
        write_outcome(out, tx)?;
    }
    Ok(())
}

fn write_outcome(out: &mut impl Write, tx: &TransactionFlowState) -> io::Result<()> {
    let response = tx.response.as_ref();
    match (tx.success, tx.tx_type) {
        (SuccessState::Success, TransactionType::Purchase) => {
            writeln!(out, "# WOOHOO - WE GOT PAID!")?;
            write_card_response(out, response)
        }
        (SuccessState::Success, TransactionType::Refund) => {
            writeln!(out, "# REFUND GIVEN - OH WELL!")?;
            write_card_response(out, response)
        }
        (SuccessState::Success, TransactionType::Settle) => {
            writeln!(out, "# SETTLEMENT SUCCESSFUL!")?;
            write_settlement_response(out, response)
        }
        (SuccessState::Failed, TransactionType::Purchase) => {
            writeln!(out, "# WE DID NOT GET PAID :(")?;
            write_card_response(out, response)
        }
        (SuccessState::Failed, TransactionType::Refund) => {
            writeln!(out, "# REFUND FAILED!")?;
            write_card_response(out, response)
        }
        (SuccessState::Failed, TransactionType::Settle) => {
            writeln!(out, "# SETTLEMENT FAILED!")?;
            write_settlement_response(out, response)
        }
        (SuccessState::Unknown, TransactionType::Purchase) => {
            writeln!(out, "# WE'RE NOT QUITE SURE WHETHER WE GOT PAID OR NOT :/")?;
            writeln!(out, "# CHECK THE LAST TRANSACTION ON THE EFTPOS ITSELF FROM THE APPROPRIATE MENU ITEM.")?;
            writeln!(out, "# IF YOU CONFIRM THAT THE CUSTOMER PAID, CLOSE THE ORDER.")?;
            writeln!(out, "# OTHERWISE, RETRY THE PAYMENT FROM SCRATCH.")
        }
        (SuccessState::Unknown, TransactionType::Refund) => {
            writeln!(out, "# WE'RE NOT QUITE SURE WHETHER THE REFUND WENT THROUGH OR NOT :/")?;
            writeln!(out, "# CHECK THE LAST TRANSACTION ON THE EFTPOS ITSELF FROM THE APPROPRIATE MENU ITEM.")?;
            writeln!(out, "# YOU CAN THE TAKE THE APPROPRIATE ACTION.")
        }
        (SuccessState::Unknown, TransactionType::Settle) => {
            writeln!(out, "# WE'RE NOT QUITE SURE WHETHER THE SETTLEMENT WENT THROUGH OR NOT :/")?;
            writeln!(out, "# CHECK THE LAST SETTLEMENT ON THE EFTPOS ITSELF.")
        }
    }
}

fn field<'a>(response: Option<&'a Value>, key: &str) -> Option<&'a str> {
    response.and_then(|r| r.get(key)).and_then(Value::as_str)
}

fn write_card_response(out: &mut impl Write, response: Option<&Value>) -> io::Result<()> {
    if response.is_none() {
        return Ok(());
    }
    writeln!(out, "# Response: {}", field(response, "host_response_text").unwrap_or_default())?;
    writeln!(out, "# RRN: {}", field(response, "rrn").unwrap_or_default())?;
    writeln!(out, "# Scheme: {}", field(response, "scheme_name").unwrap_or_default())?;
    writeln!(out, "# Customer Receipt:")?;
    writeln!(out, "{}", field(response, "customer_receipt").unwrap_or_default().trim_end())
}

fn write_settlement_response(out: &mut impl Write, response: Option<&Value>) -> io::Result<()> {
    if response.is_none() {
        return Ok(());
    }
    writeln!(out, "# Response: {}", field(response, "host_response_text").unwrap_or_default())?;
    writeln!(out, "# Merchant Receipt:")?;
    writeln!(out, "{}", field(response, "merchant_receipt").unwrap_or_default().trim_end())
}

// =============================================================================
// Actions & Status
// =============================================================================

fn write_actions(out: &mut impl Write, snap: &SessionSnapshot, profile: Profile) -> io::Result<()> {
    writeln!(out, "# ----------- AVAILABLE ACTIONS ------------")?;

    let idle = snap.flow == SpiFlow::Idle;
    let unpaired = snap.status == SpiStatus::Unpaired;

    match profile {
        Profile::Hammer => {
            let hammering = snap.driver.phase.is_active();
            if idle && !hammering {
                writeln!(out, "# [hammer] - start hammering!")?;
                writeln!(out, "# [min_gap:10] - minimum wait between tx in seconds")?;
                writeln!(out, "# [max_gap:20] - maximum wait between tx in seconds")?;
            }
            if hammering {
                writeln!(out, "# [stop] - stop hammering!")?;
            }
        }
        Profile::Pizza => {
            if idle {
                writeln!(out, "# [pizza:funghi] - charge for a pizza!")?;
                writeln!(out, "# [yuck] - hand out a refund!")?;
                writeln!(out, "# [settle] - Initiate Settlement")?;
            }
        }
    }

    if unpaired && idle {
        writeln!(out, "# [pos_id:{}] - Set the POS ID", profile.example_pos_id())?;
        writeln!(out, "# [eftpos_address:10.161.104.104] - Set the EFTPOS ADDRESS")?;
        writeln!(out, "# [pair] - Pair with Eftpos")?;
    }
    if !unpaired && idle {
        writeln!(out, "# [unpair] - Unpair and Disconnect")?;
    }

    match snap.flow {
        SpiFlow::Pairing => {
            writeln!(out, "# [pair_cancel] - Cancel Pairing")?;
            if snap.pairing.awaiting_check_from_pos {
                writeln!(out, "# [pair_confirm] - Confirm Pairing Code")?;
            }
            if snap.pairing.finished {
                writeln!(out, "# [ok] - acknowledge final")?;
            }
        }
        SpiFlow::Transaction => {
            if snap.tx.awaiting_signature_check {
                writeln!(out, "# [tx_sign_accept] - Accept Signature")?;
                writeln!(out, "# [tx_sign_decline] - Decline Signature")?;
            }
            if !snap.tx.finished && !snap.tx.attempting_to_cancel {
                writeln!(out, "# [tx_cancel] - Attempt to Cancel Tx")?;
            }
            if snap.tx.finished {
                writeln!(out, "# [ok] - acknowledge final")?;
            }
        }
        SpiFlow::Idle => {}
    }

    if profile == Profile::Hammer {
        writeln!(out, "# [stats] - print hammering statistics")?;
    }
    writeln!(out, "# [status] - reprint buttons/status")?;
    writeln!(out, "# [bye] - exit")?;
    writeln!(out)
}

fn write_status(out: &mut impl Write, snap: &SessionSnapshot, profile: Profile) -> io::Result<()> {
    writeln!(out, "# --------------- STATUS ------------------")?;
    writeln!(out, "# {} <-> Eftpos: {} #", snap.state.pos_id, snap.state.terminal_address)?;
    writeln!(out, "# SPI STATUS: {}     FLOW: {} #", snap.status, snap.flow)?;
    if profile == Profile::Hammer {
        writeln!(
            out,
            "# Min Gap:{}  Max Gap: {} #",
            snap.gap.min_ms() / 1000,
            snap.gap.max_ms() / 1000
        )?;
        if let Some(error) = &snap.driver.last_error {
            writeln!(out, "# Last Run Ended Early: {} #", error)?;
        }
    }
    writeln!(out, "# -----------------------------------------")
}

// =============================================================================
// Statistics
// =============================================================================

pub fn write_stats(out: &mut impl Write, stats: &StatsSnapshot) -> io::Result<()> {
    writeln!(out, "Attempts {}", stats.attempts)?;
    writeln!(out, "Disconnects {}", stats.disconnects)?;
    writeln!(out, "Reconnects {}", stats.reconnects)?;
    writeln!(out, "Time Connected {}", format_duration(stats.connected))?;
    writeln!(out, "Time Disconnected {}", format_duration(stats.disconnected))?;
    writeln!(out, "Successes {}", stats.count(OutcomeKind::Success))?;
    writeln!(out, "Failures {}", stats.count(OutcomeKind::Failed))?;
    writeln!(out, "Unknowns {}", stats.count(OutcomeKind::Unknown))?;
    writeln!(out, "Rejected {}", stats.count(OutcomeKind::Rejected))?;
    if let Some(elapsed) = stats.elapsed {
        writeln!(out, "Elapsed {}", format_duration(elapsed))?;
    }
    Ok(())
}

/// `hh:mm:ss.fff`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        d.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "00:00:00.000");
        assert_eq!(format_duration(Duration::from_millis(3_723_045)), "01:02:03.045");
    }

    #[test]
    fn test_stats_lines() {
        let mut stats = StatsSnapshot {
            attempts: 3,
            connected: Duration::from_secs(90),
            ..Default::default()
        };
        stats.outcome_counts.insert(OutcomeKind::Success, 2);
        stats.outcome_counts.insert(OutcomeKind::Failed, 1);

        let mut out = Vec::new();
        write_stats(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Attempts 3\n"));
        assert!(text.contains("Time Connected 00:01:30.000\n"));
        assert!(text.contains("Successes 2\n"));
        assert!(text.contains("Failures 1\n"));
        assert!(text.contains("Unknowns 0\n"));
        assert!(!text.contains("Elapsed"));
    }

    #[test]
    fn test_unknown_purchase_asks_for_a_terminal_check() {
        let mut tx = TransactionFlowState::started("pizza-1", TransactionType::Purchase, 1000);
        tx.finished = true;

        let mut out = Vec::new();
        write_transaction(&mut out, &tx).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("# Amount: $10.00"));
        assert!(text.contains("# WE'RE NOT QUITE SURE WHETHER WE GOT PAID OR NOT :/"));
        assert!(!text.contains("# RRN"));
    }
}
