use std::process::Command;

use tollgate_core::{EnforcementFailure, MacAddress};
use tollgate_ipc::Action;
use tracing::{error, info};

/// The enforcement point: applies a validated command to the packet
/// filter.
pub trait EnforcementGateway: Send + Sync {
    fn apply(&self, action: Action, mac: MacAddress) -> Result<(), EnforcementFailure>;
}

/// Toggles per-MAC accept rules in iptables and ip6tables. A grant or
/// revoke only counts when both address families took the change.
pub struct PacketFilter {
    table: String,
    chain: String,
}

impl PacketFilter {
    pub fn new() -> Self {
        PacketFilter::with_rules("mangle", "allowed")
    }

    pub fn with_rules(table: &str, chain: &str) -> Self {
        PacketFilter {
            table: table.to_string(),
            chain: chain.to_string(),
        }
    }

    fn run_command(&self, command: &str, args: &[&str]) -> Result<(), EnforcementFailure> {
        let status = Command::new(command)
            .args(args)
            .status()
            .map_err(|e| EnforcementFailure(format!("failed to run {command}: {e}")))?;
        if !status.success() {
            let msg = format!("{command} {args:?} failed with status {status}");
            error!("{}", msg);
            return Err(EnforcementFailure(msg));
        }
        Ok(())
    }
}

impl Default for PacketFilter {
    fn default() -> Self {
        PacketFilter::new()
    }
}

impl EnforcementGateway for PacketFilter {
    fn apply(&self, action: Action, mac: MacAddress) -> Result<(), EnforcementFailure> {
        let flag = match action {
            Action::Grant => "-A",
            Action::Revoke => "-D",
        };
        let mac_str = mac.to_string();
        info!("{} {} in {}/{}", action, mac, self.table, self.chain);
        for tool in ["iptables", "ip6tables"] {
            self.run_command(
                tool,
                &[
                    "-t",
                    &self.table,
                    flag,
                    &self.chain,
                    "-m",
                    "mac",
                    "--mac-source",
                    &mac_str,
                    "-j",
                    "ACCEPT",
                ],
            )?;
        }
        Ok(())
    }
}
