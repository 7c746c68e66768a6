//! Test utilities & fixtures.
//! A scripted SIM800 that answers every command of a healthy wake cycle.
#![allow(dead_code)]

use trapwatch::config::Config;
use trapwatch::modem::{CommandSession, ProtocolLimits, ScriptedChannel};

/// Epoch seconds of `24/01/15,13:45:02`, the time the scripted modem reports.
pub const NETWORK_TIME: i64 = 1_705_326_302;

pub const TIME_ROW: &str = "\r\n+CIPGSMLOC: 0,24/01/15,13:45:02\r\n\r\nOK\r\n";

pub const RECIPIENT: &str = "+64215550100";

pub fn config() -> Config {
    let mut config = Config::default();
    config.alert.recipient = Some(RECIPIENT.to_string());
    config.registration.max_attempts = 3;
    config
}

/// Sticky replies for every step of a cycle: registered on the home network, RSSI 20,
/// a good time fix and an accepted SMS. One-shot replies added afterwards take priority.
pub fn healthy_modem() -> ScriptedChannel {
    ScriptedChannel::new()
        .respond_always("AT", "\r\nOK\r\n")
        .respond_always("AT+CSCS=\"GSM\"", "\r\nOK\r\n")
        .respond_always("AT+CMGF=1", "\r\nOK\r\n")
        .respond_always("AT+CNMI=1,2,0,0,0", "\r\nOK\r\n")
        .respond_always("AT+CREG?", "\r\n+CREG: 0,1\r\n\r\nOK\r\n")
        .respond_always("AT+CGATT=1", "\r\nOK\r\n")
        .respond_always("AT+CSQ", "\r\n+CSQ: 20,0\r\n\r\nOK\r\n")
        .respond_always("AT+SAPBR=0,1", "\r\nOK\r\n")
        .respond_always("AT+SAPBR=3,1,\"Contype\",\"GPRS\"", "\r\nOK\r\n")
        .respond_always("AT+SAPBR=1,1", "\r\nOK\r\n")
        .respond_always("AT+CIPGSMLOC=2,1", TIME_ROW)
        .respond_always(&format!("AT+CMGS=\"{}\"", RECIPIENT), "\r\n> ")
        .respond_always("\u{1a}", "\r\n+CMGS: 17\r\n\r\nOK\r\n")
}

pub fn session(channel: ScriptedChannel) -> CommandSession<ScriptedChannel> {
    CommandSession::new(channel, ProtocolLimits::from(&config()))
}
