use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ykpgp_apdu_core::transport::MockTransport;
use ykpgp_apdu_core::transport::channel::channel;
use ykpgp_apdu_core::{ResponseError, StatusOutcome, StatusWord, TransportError};
use ykpgp_openpgp::{
    CardSession, CommandSession, DecipherVector, Error, RunConfig, SelfTest, SessionPhase,
    SkipReason, StepFailure, StepKind, StepOutcome,
};

const PIN: &str = "123456";
const POINT: [u8; 32] = [0x42; 32];
const PLAINTEXT: &[u8] = b"0123456789abcdef0123456789abcdef";

fn reply(payload: &[u8], status: u16) -> Vec<u8> {
    let mut raw = payload.to_vec();
    raw.extend_from_slice(&status.to_be_bytes());
    raw
}

fn ok() -> Vec<u8> {
    reply(&[], 0x9000)
}

fn decipher_config() -> RunConfig {
    RunConfig::new()
        .with_pin(PIN)
        .with_decipher(DecipherVector::new(POINT.to_vec()).with_expected_plaintext(PLAINTEXT))
}

fn kinds(report: &ykpgp_openpgp::Report) -> Vec<StepKind> {
    report.steps().iter().map(|s| s.step()).collect()
}

#[tokio::test]
async fn test_decipher_scenario_succeeds_with_matching_plaintext() {
    let mut transport = MockTransport::new([
        ok(),
        reply(b"https://example.com", 0x9000),
        ok(),
        reply(PLAINTEXT, 0x9000),
    ]);
    let config = decipher_config();

    let mut session = CommandSession::new(&mut transport, &config);
    let report = session.run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(report.steps().len(), 4);
    assert!(report.steps().iter().all(|s| s.outcome().is_success()));

    let url = report.step(StepKind::FetchUrl).unwrap();
    assert_eq!(url.message(), "Got URL: https://example.com");
    assert_eq!(url.payload().unwrap().as_ref(), b"https://example.com");

    let decipher = report.step(StepKind::Decipher).unwrap();
    assert_eq!(decipher.self_test(), Some(SelfTest::Match));
    assert!(decipher.message().contains("plaintext matches expected"));
    assert_eq!(decipher.payload().unwrap().as_ref(), PLAINTEXT);

    assert!(session.state().has_selected_application());
    assert_eq!(
        session.state().last_deciphered_payload().unwrap().as_ref(),
        PLAINTEXT
    );

    let sent = transport.commands();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0].as_ref(), hex::decode("00A4040006D27600012401").unwrap());
    assert_eq!(sent[1].as_ref(), hex::decode("00CA5F5000").unwrap());
    assert_eq!(sent[2].as_ref(), hex::decode("0020008206313233343536").unwrap());
    assert_eq!(&sent[3][..12], hex::decode("002A808627A6257F49228620").unwrap());
    assert_eq!(&sent[3][12..], &POINT);
    assert_eq!(transport.pending(), 0);
}

#[tokio::test]
async fn test_wrong_pin_skips_decipher_and_completes() {
    let mut transport = MockTransport::new([ok(), ok(), reply(&[], 0x63C2)]);
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        kinds(&report),
        [
            StepKind::SelectApplication,
            StepKind::FetchUrl,
            StepKind::VerifyPinForDecipher,
            StepKind::Decipher
        ]
    );
    assert_eq!(
        report.steps()[1].message(),
        "No URL stored on the key."
    );
    assert_eq!(
        report.steps()[2].outcome(),
        &StepOutcome::Card(StatusOutcome::PinVerificationFailed { retries_remaining: 2 })
    );
    let decipher = &report.steps()[3];
    assert_eq!(
        decipher.outcome(),
        &StepOutcome::Skipped(SkipReason::PinNotVerified)
    );
    assert_eq!(decipher.outcome().to_string(), "skipped: PIN not verified");

    // No PSO: DECIPHER was built or sent
    assert_eq!(transport.commands().len(), 3);
}

#[tokio::test]
async fn test_failed_select_aborts_with_single_result() {
    for status in [0x6A82u16, 0x6D00, 0x6982] {
        let mut transport = MockTransport::new([reply(&[], status), ok(), ok()]);
        let config = decipher_config().with_sign_data(vec![0x11; 32]);

        let report = CommandSession::new(&mut transport, &config).run().await;

        assert_eq!(report.phase(), SessionPhase::Aborted);
        assert_eq!(report.steps().len(), 1);
        assert_eq!(
            report.steps()[0].outcome(),
            &StepOutcome::Card(StatusWord::from_u16(status).classify())
        );
        assert_eq!(transport.commands().len(), 1);
    }
}

#[tokio::test]
async fn test_select_failure_message_carries_status() {
    let mut transport = MockTransport::new([reply(&[], 0x6A82)]);
    let config = RunConfig::new();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(
        report.steps()[0].message(),
        "OpenPGP application selection failed. SW returned by the key: 6A82."
    );
    assert_eq!(
        report.steps()[0].outcome(),
        &StepOutcome::Card(StatusOutcome::ApplicationNotFound)
    );
}

#[tokio::test]
async fn test_sign_path_runs_after_decipher_pin_failure() {
    let signature = vec![0x5A; 64];
    let mut transport = MockTransport::new([
        ok(),
        reply(&[], 0x63C1),
        ok(),
        reply(&signature, 0x9000),
    ]);
    let config = decipher_config()
        .with_fetch_url(false)
        .with_sign_data(vec![0x11; 32]);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        kinds(&report),
        [
            StepKind::SelectApplication,
            StepKind::VerifyPinForDecipher,
            StepKind::Decipher,
            StepKind::VerifyPinForSign,
            StepKind::Sign
        ]
    );
    assert_eq!(
        report.step(StepKind::Sign).unwrap().payload().unwrap().as_ref(),
        signature.as_slice()
    );

    let sent = transport.commands();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|c| !c.starts_with(&[0x00, 0x2A, 0x80, 0x86])));
    assert_eq!(sent[2].as_ref(), hex::decode("0020008106313233343536").unwrap());
    assert!(sent[3].starts_with(&[0x00, 0x2A, 0x9E, 0x9A, 0x20]));
}

#[tokio::test]
async fn test_step_order_is_independent_of_outcomes() {
    let mut transport = MockTransport::new([
        ok(),
        reply(&[], 0x6A88),
        ok(),
        reply(&[], 0x6982),
        ok(),
        reply(&[], 0x6A80),
    ]);
    let config = decipher_config().with_sign_data(vec![0x11; 32]);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        kinds(&report),
        [
            StepKind::SelectApplication,
            StepKind::FetchUrl,
            StepKind::VerifyPinForDecipher,
            StepKind::Decipher,
            StepKind::VerifyPinForSign,
            StepKind::Sign
        ]
    );
    assert_eq!(
        report.step(StepKind::FetchUrl).unwrap().message(),
        "Failed to get URL. SW returned by the key: 6A88."
    );
    assert!(!report.step(StepKind::Decipher).unwrap().outcome().is_success());
    assert!(report.step(StepKind::Decipher).unwrap().self_test().is_none());
}

#[tokio::test]
async fn test_transport_failure_aborts_remaining_steps() {
    let mut transport = MockTransport::new([ok()]);
    transport.push_error(TransportError::Transmission);
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Aborted);
    assert_eq!(report.steps().len(), 2);
    assert_eq!(
        report.steps()[1].outcome(),
        &StepOutcome::Failed(StepFailure::Transport(TransportError::Transmission))
    );
    assert_eq!(transport.commands().len(), 2);
}

#[tokio::test]
async fn test_short_response_aborts() {
    let mut transport = MockTransport::new([ok(), vec![0x90]]);
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Aborted);
    assert_eq!(
        report.steps()[1].outcome(),
        &StepOutcome::Failed(StepFailure::Parse(ResponseError::TooShort(1)))
    );
}

#[tokio::test]
async fn test_disconnected_transport_sends_nothing() {
    let mut transport = MockTransport::disconnected();
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Aborted);
    assert_eq!(report.steps().len(), 1);
    assert_eq!(report.steps()[0].message(), "The key is not connected");
    assert!(transport.commands().is_empty());
}

#[tokio::test]
async fn test_oversized_ciphertext_fails_only_its_step() {
    let mut transport = MockTransport::new([ok(), ok(), ok(), reply(&[0x01; 64], 0x9000)]);
    let config = RunConfig::new()
        .with_pin(PIN)
        .with_fetch_url(false)
        .with_decipher(DecipherVector::new(vec![0x04; 250]))
        .with_sign_data(vec![0x11; 32]);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert!(matches!(
        report.step(StepKind::Decipher).unwrap().outcome(),
        StepOutcome::Failed(StepFailure::Encoding(_))
    ));
    assert!(report.step(StepKind::Sign).unwrap().outcome().is_success());
    assert_eq!(transport.commands().len(), 4);
}

#[tokio::test]
async fn test_missing_pin_skips_both_steps() {
    let mut transport = MockTransport::new([ok()]);
    let config = RunConfig::new()
        .with_fetch_url(false)
        .with_decipher(DecipherVector::new(POINT.to_vec()));

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        report.steps()[1].outcome(),
        &StepOutcome::Skipped(SkipReason::NoPin)
    );
    assert_eq!(
        report.steps()[2].outcome(),
        &StepOutcome::Skipped(SkipReason::NoPin)
    );
    assert_eq!(transport.commands().len(), 1);
}

#[tokio::test]
async fn test_plaintext_mismatch_is_reported_not_fatal() {
    let mut transport = MockTransport::new([ok(), ok(), reply(b"something else", 0x9000)]);
    let config = decipher_config().with_fetch_url(false);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    let decipher = report.step(StepKind::Decipher).unwrap();
    assert!(decipher.outcome().is_success());
    assert_eq!(decipher.self_test(), Some(SelfTest::Mismatch));
}

#[tokio::test]
async fn test_runs_start_from_fresh_state() {
    let mut transport = MockTransport::new([ok(), reply(&[], 0x6A82)]);
    let config = RunConfig::new().with_fetch_url(false);
    let mut session = CommandSession::new(&mut transport, &config);

    assert!(session.run().await.is_completed());
    assert!(session.state().has_selected_application());

    let second = session.run().await;
    assert_eq!(second.phase(), SessionPhase::Aborted);
    assert_eq!(second.steps().len(), 1);
    assert!(!session.state().has_selected_application());
}

#[tokio::test]
async fn test_unanswered_command_times_out() {
    let (mut transport, _worker) = channel(1);
    let config = RunConfig::new().with_command_timeout(Duration::from_millis(50));

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Aborted);
    assert_eq!(
        report.steps()[0].outcome(),
        &StepOutcome::Failed(StepFailure::Transport(TransportError::Timeout))
    );
}

#[tokio::test]
async fn test_dropped_request_resolves_to_session_closed() {
    let (mut transport, mut worker) = channel(1);
    let card = tokio::spawn(async move {
        // Card removed mid-command
        while let Some(request) = worker.recv().await {
            drop(request);
        }
    });
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Aborted);
    assert_eq!(report.steps().len(), 1);
    assert_eq!(
        report.steps()[0].outcome(),
        &StepOutcome::Failed(StepFailure::Transport(TransportError::SessionClosed))
    );

    drop(transport);
    card.await.unwrap();
}

#[tokio::test]
async fn test_scenario_over_channel_worker() {
    let (transport, mut worker) = channel(1);
    let card = tokio::spawn(async move {
        let mut replies = vec![
            ok(),
            reply(b"https://example.com", 0x9000),
            ok(),
            reply(PLAINTEXT, 0x9000),
        ]
        .into_iter();
        while let Some(request) = worker.recv().await {
            let reply = replies.next().map(Bytes::from).ok_or(TransportError::Transmission);
            request.respond(reply);
        }
    });

    let session = CardSession::new(transport);
    let report = session.run(&decipher_config()).await.unwrap();
    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        report.step(StepKind::Decipher).unwrap().self_test(),
        Some(SelfTest::Match)
    );

    drop(session);
    card.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_try_run_is_rejected() {
    let (transport, mut worker) = channel(1);
    let session = Arc::new(CardSession::new(transport));
    let config = RunConfig::new().with_fetch_url(false);

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        let config = config.clone();
        async move { session.run(&config).await }
    });

    // The first run holds the card while its SELECT is unanswered
    let request = worker.recv().await.unwrap();
    assert_eq!(
        session.try_run(&config).await.unwrap_err(),
        Error::RunInProgress
    );

    request.respond(Ok(Bytes::from(ok())));
    let report = first.await.unwrap().unwrap();
    assert!(report.is_completed());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_sending() {
    let session = CardSession::new(MockTransport::new([ok()]));
    let config = RunConfig::new().with_sign_data(Vec::new());

    assert!(matches!(
        session.run(&config).await,
        Err(Error::InvalidConfig(_))
    ));
    assert!(session.into_transport().commands().is_empty());
}

#[tokio::test]
async fn test_empty_pin_is_rejected_before_sending() {
    let session = CardSession::new(MockTransport::new([ok()]));
    let config = decipher_config().with_pin("");

    assert!(matches!(
        session.run(&config).await,
        Err(Error::InvalidConfig(_))
    ));
    assert!(session.into_transport().commands().is_empty());
}

#[tokio::test]
async fn test_oversized_pin_fails_encoding_and_skips_decipher() {
    let mut transport = MockTransport::new([ok()]);
    let config = decipher_config()
        .with_pin(vec![b'1'; 256])
        .with_fetch_url(false);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        kinds(&report),
        [
            StepKind::SelectApplication,
            StepKind::VerifyPinForDecipher,
            StepKind::Decipher
        ]
    );
    assert!(matches!(
        report.steps()[1].outcome(),
        StepOutcome::Failed(StepFailure::Encoding(_))
    ));
    assert_eq!(
        report.steps()[2].outcome(),
        &StepOutcome::Skipped(SkipReason::PinNotVerified)
    );

    // Only SELECT reached the card
    assert_eq!(transport.commands().len(), 1);
}

#[tokio::test]
async fn test_serial_number_is_read_from_aid() {
    let aid = hex::decode("D2760001240103040006123456780000").unwrap();
    let mut transport = MockTransport::new([ok(), reply(&aid, 0x9000)]);
    let config = RunConfig::new().with_fetch_serial(true).with_fetch_url(false);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    assert_eq!(
        kinds(&report),
        [StepKind::SelectApplication, StepKind::FetchSerial]
    );
    let serial = report.step(StepKind::FetchSerial).unwrap();
    assert_eq!(serial.message(), "The key serial number is: 12345678.");
    assert_eq!(serial.payload().unwrap().as_ref(), &[0x12, 0x34, 0x56, 0x78]);
    assert_eq!(transport.commands()[1].as_ref(), hex::decode("00CA004F00").unwrap());
}

#[tokio::test]
async fn test_serial_failures_do_not_stop_the_run() {
    let mut transport = MockTransport::new([
        ok(),
        reply(&[0xD2, 0x76], 0x9000),
        reply(b"https://example.com", 0x9000),
    ]);
    let config = RunConfig::new().with_fetch_serial(true);

    let report = CommandSession::new(&mut transport, &config).run().await;

    assert_eq!(report.phase(), SessionPhase::Completed);
    let serial = report.step(StepKind::FetchSerial).unwrap();
    assert_eq!(
        serial.message(),
        "The application identifier is too short to hold a serial number."
    );
    assert!(serial.payload().is_none());
    assert!(report.step(StepKind::FetchUrl).unwrap().outcome().is_success());

    let mut transport = MockTransport::new([ok(), reply(&[], 0x6A88)]);
    let config = RunConfig::new().with_fetch_serial(true).with_fetch_url(false);
    let report = CommandSession::new(&mut transport, &config).run().await;
    assert!(report.is_completed());
    assert_eq!(
        report.step(StepKind::FetchSerial).unwrap().message(),
        "Failed to get the serial number. SW returned by the key: 6A88."
    );
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let mut transport = MockTransport::new([
        ok(),
        reply(b"https://example.com", 0x9000),
        reply(&[], 0x63C2),
    ]);
    let config = decipher_config();

    let report = CommandSession::new(&mut transport, &config).run().await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["phase"], "completed");
    assert_eq!(json["steps"][0]["step"], "select_application");
    assert_eq!(json["steps"][0]["outcome"]["kind"], "card");
    assert_eq!(json["steps"][0]["outcome"]["detail"]["kind"], "success");
    assert_eq!(
        json["steps"][1]["payload"],
        hex::encode_upper(b"https://example.com")
    );
    assert_eq!(
        json["steps"][2]["outcome"]["detail"]["retries_remaining"],
        2
    );
    assert_eq!(json["steps"][3]["outcome"]["kind"], "skipped");
    assert_eq!(json["steps"][3]["outcome"]["detail"], "pin_not_verified");
    assert!(!json.to_string().contains("313233343536"));
}
