//! Bounded registration wait.

mod common;

use std::time::Duration;

use tokio::time::Instant;
use trapwatch::cellular::RegistrationWaiter;
use trapwatch::modem::ScriptedChannel;

fn waiter() -> RegistrationWaiter {
    RegistrationWaiter {
        status_timeout: Duration::from_millis(1000),
        attach_timeout: Duration::from_millis(1000),
        retry_interval: Duration::from_millis(2000),
    }
}

#[tokio::test(start_paused = true)]
async fn registers_after_attach_requests() {
    let channel = ScriptedChannel::new()
        .respond("AT+CREG?", "\r\n+CREG: 0,2\r\n\r\nOK\r\n")
        .respond("AT+CREG?", "\r\n+CREG: 0,2\r\n\r\nOK\r\n")
        .respond("AT+CREG?", "\r\n+CREG: 0,5\r\n\r\nOK\r\n")
        .respond_always("AT+CGATT=1", "\r\nOK\r\n");
    let mut session = common::session(channel);

    let started = Instant::now();
    assert!(waiter().wait_for_registration(&mut session, 10).await.unwrap());
    assert!(started.elapsed() >= Duration::from_millis(4000));
    assert_eq!(session.channel().count("AT+CREG?"), 3);
    assert_eq!(session.channel().count("AT+CGATT=1"), 2);
}

#[tokio::test(start_paused = true)]
async fn registered_first_poll_sends_no_attach() {
    let mut session = common::session(common::healthy_modem());
    assert!(waiter().wait_for_registration(&mut session, 10).await.unwrap());
    assert_eq!(session.channel().count("AT+CGATT=1"), 0);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let channel = ScriptedChannel::new()
        .respond_always("AT+CREG?", "\r\n+CREG: 0,3\r\n\r\nOK\r\n")
        .respond_always("AT+CGATT=1", "\r\nERROR\r\n");
    let mut session = common::session(channel);

    assert!(!waiter().wait_for_registration(&mut session, 4).await.unwrap());
    assert_eq!(session.channel().count("AT+CREG?"), 4);
    assert_eq!(session.channel().count("AT+CGATT=1"), 4);
}

#[tokio::test(start_paused = true)]
async fn silent_modem_does_not_hang() {
    let mut session = common::session(ScriptedChannel::new());
    let started = Instant::now();
    assert!(!waiter().wait_for_registration(&mut session, 2).await.unwrap());
    // Two status polls and two attach requests time out, one retry interval between
    assert!(started.elapsed() < Duration::from_secs(30));
}
