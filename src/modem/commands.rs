//! AT command strings used by the node (SIM800-family modems).

/// Basic liveness check
pub const LIVENESS: &str = "AT";
/// Signal quality report: `+CSQ: <rssi>,<ber>`
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
/// Network registration status: `+CREG: <n>,<stat>`
pub const REGISTRATION_STATUS: &str = "AT+CREG?";
/// Attach to the packet domain
pub const ATTACH: &str = "AT+CGATT=1";
/// GSM 7-bit character set
pub const CHARSET_GSM: &str = "AT+CSCS=\"GSM\"";
/// SMS text mode
pub const TEXT_MODE: &str = "AT+CMGF=1";
/// Route new SMS indications straight to the serial link
pub const NOTIFICATION_ROUTING: &str = "AT+CNMI=1,2,0,0,0";
/// Bearer profile 1: connection type GPRS
pub const BEARER_CONTYPE: &str = "AT+SAPBR=3,1,\"Contype\",\"GPRS\"";
/// Open bearer profile 1
pub const BEARER_OPEN: &str = "AT+SAPBR=1,1";
/// Close bearer profile 1
pub const BEARER_CLOSE: &str = "AT+SAPBR=0,1";
/// GSM location service, time-only variant: `+CIPGSMLOC: <code>,<date>,<time>`
pub const LOCATION_TIME: &str = "AT+CIPGSMLOC=2,1";

/// Response prefixes
pub const CSQ_PREFIX: &str = "+CSQ:";
pub const CREG_PREFIX: &str = "+CREG:";
pub const GSMLOC_PREFIX: &str = "+CIPGSMLOC:";
pub const CMGS_PREFIX: &str = "+CMGS:";

/// Ends an SMS body in text mode (Ctrl-Z).
pub const MESSAGE_TERMINATOR: u8 = 0x1A;

/// Set the bearer access point name.
pub fn bearer_apn(apn: &str) -> String {
    format!("AT+SAPBR=3,1,\"APN\",\"{}\"", apn)
}

/// Start an SMS to `recipient` (international format).
pub fn send_message(recipient: &str) -> String {
    format!("AT+CMGS=\"{}\"", recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_quote_arguments() {
        assert_eq!(send_message("+15550100"), "AT+CMGS=\"+15550100\"");
        assert_eq!(bearer_apn("internet"), "AT+SAPBR=3,1,\"APN\",\"internet\"");
    }
}
