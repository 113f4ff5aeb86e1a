//! Simulated agent: moves a stored command through its lifecycle one step per tick.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use shared::domain::{Command, CommandId, CommandResult, CommandStatus, ScanParams};

const ASSET_SAMPLE_CAP: u128 = 256;
const HOSTS_PER_ASSET: u128 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Acknowledged,
    Started,
    Scanned,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SimulatedCommand {
    command: Command,
    scanned: usize,
    assets: u64,
}

impl SimulatedCommand {
    pub fn new(id: CommandId, params: ScanParams, now: DateTime<Utc>) -> Self {
        Self {
            command: Command {
                id,
                status: CommandStatus::Pending,
                params,
                created_at: now,
                started_at: None,
                completed_at: None,
                result: None,
            },
            scanned: 0,
            assets: 0,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Applies the next lifecycle step. Terminal commands never move again.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        match self.command.status {
            CommandStatus::Pending => {
                self.command.status = CommandStatus::Ack;
                Some(Transition::Acknowledged)
            }
            CommandStatus::Ack => {
                self.command.status = CommandStatus::Running;
                self.command.started_at = Some(now);
                self.set_step(format!(
                    "Resolving {} target(s)",
                    self.command.params.targets.len()
                ));
                Some(Transition::Started)
            }
            CommandStatus::Running => Some(self.scan_next(now)),
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Unknown(_) => None,
        }
    }

    fn scan_next(&mut self, now: DateTime<Utc>) -> Transition {
        let total = self.command.params.targets.len();
        let Some(target) = self.command.params.targets.get(self.scanned).cloned() else {
            self.finish(now, CommandStatus::Completed, Vec::new());
            return Transition::Completed;
        };

        match host_count(&target) {
            Some(hosts) => {
                self.assets += estimated_assets(hosts);
                self.scanned += 1;
                self.set_step(format!("Scanning {target} ({}/{total})", self.scanned));
                Transition::Scanned
            }
            None => {
                self.finish(
                    now,
                    CommandStatus::Failed,
                    vec![format!("invalid target: {target}")],
                );
                Transition::Failed
            }
        }
    }

    fn set_step(&mut self, step: String) {
        self.command.result = Some(CommandResult {
            step: Some(step),
            ..CommandResult::default()
        });
    }

    fn finish(&mut self, now: DateTime<Utc>, status: CommandStatus, errors: Vec<String>) {
        self.command.status = status;
        self.command.completed_at = Some(now);
        self.command.result = Some(CommandResult {
            step: None,
            assets_discovered: Some(self.assets),
            targets_scanned: Some(self.scanned as u64),
            errors,
        });
    }
}

/// Number of addresses covered by an IP address or CIDR block; `None` when `target` is neither.
pub fn host_count(target: &str) -> Option<u128> {
    let Some((address, prefix)) = target.split_once('/') else {
        return target.parse::<IpAddr>().ok().map(|_| 1);
    };
    let address: IpAddr = address.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    let bits = if address.is_ipv4() { 32 } else { 128 };
    if prefix > bits {
        return None;
    }
    Some(1u128.checked_shl(bits - prefix).unwrap_or(u128::MAX))
}

fn estimated_assets(hosts: u128) -> u64 {
    (hosts.min(ASSET_SAMPLE_CAP) / HOSTS_PER_ASSET).max(1) as u64
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
