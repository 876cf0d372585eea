use cardcore::{status_message, ApduCommand, ApduError, ApduResponse};

#[test]
fn test_encode_header_only() {
    let cmd = ApduCommand::new("00", "A4", "04", "00");
    assert_eq!(cmd.to_hex().unwrap(), "00A40400");
}

#[test]
fn test_encode_with_data_derives_lc() {
    let cmd = ApduCommand::new("00", "A4", "04", "00").with_data("A000000003");
    assert_eq!(cmd.to_hex().unwrap(), "00A4040005A000000003");
}

#[test]
fn test_encode_with_data_and_le() {
    let cmd = ApduCommand::new("00", "a4", "04", "00")
        .with_data("3f00")
        .with_le("08");
    // Lowercase input normalizes to uppercase on the wire
    assert_eq!(cmd.to_hex().unwrap(), "00A40400023F0008");
}

#[test]
fn test_encode_empty_data_omits_lc() {
    let cmd = ApduCommand::new("00", "84", "00", "00")
        .with_data("")
        .with_le("08");
    assert_eq!(cmd.to_hex().unwrap(), "0084000008");
}

#[test]
fn test_validate_rejects_bad_byte_field() {
    let cmd = ApduCommand::new("0", "A4", "04", "00");
    assert!(matches!(
        cmd.validate(),
        Err(ApduError::InvalidByteField { field: "CLA", .. })
    ));

    let cmd = ApduCommand::new("00", "ZZ", "04", "00");
    assert!(matches!(
        cmd.validate(),
        Err(ApduError::InvalidByteField { field: "INS", .. })
    ));
}

#[test]
fn test_validate_rejects_odd_data() {
    let cmd = ApduCommand::new("00", "A4", "04", "00").with_data("ABC");
    assert!(matches!(cmd.validate(), Err(ApduError::InvalidData(_))));
}

#[test]
fn test_parse_header_only() {
    let cmd = ApduCommand::parse("00A40400").unwrap();
    assert_eq!(cmd.cla, "00");
    assert_eq!(cmd.ins, "A4");
    assert_eq!(cmd.p1, "04");
    assert_eq!(cmd.p2, "00");
    assert_eq!(cmd.data, None);
    assert_eq!(cmd.le, None);
}

#[test]
fn test_parse_single_trailing_byte_is_le() {
    // One trailing byte always reads as LE, never as a data-less LC
    let cmd = ApduCommand::parse("0084000008").unwrap();
    assert_eq!(cmd.data, None);
    assert_eq!(cmd.le, Some("08".to_string()));
}

#[test]
fn test_parse_lc_data_and_le() {
    let cmd = ApduCommand::parse("00A40400023F0008").unwrap();
    assert_eq!(cmd.data, Some("3F00".to_string()));
    assert_eq!(cmd.le, Some("08".to_string()));
}

#[test]
fn test_parse_clamps_overlong_lc() {
    // LC claims 16 bytes but only 2 follow; the data is what is there
    let cmd = ApduCommand::parse("00A40400103F00").unwrap();
    assert_eq!(cmd.data, Some("3F00".to_string()));
    assert_eq!(cmd.le, None);
}

#[test]
fn test_parse_accepts_whitespace_and_lowercase() {
    let cmd = ApduCommand::parse("00 a4 04 00 02 3f 00").unwrap();
    assert_eq!(cmd.to_hex().unwrap(), "00A40400023F00");
}

#[test]
fn test_parse_rejects_short_and_non_hex() {
    assert!(matches!(
        ApduCommand::parse("00A404"),
        Err(ApduError::CommandTooShort)
    ));
    assert!(matches!(
        ApduCommand::parse("00A4040G"),
        Err(ApduError::CommandNotHex)
    ));
    assert!(matches!(
        ApduCommand::parse(""),
        Err(ApduError::CommandNotHex)
    ));
}

#[test]
fn test_parse_round_trips_encoded_commands() {
    let original = ApduCommand::new("00", "82", "00", "00")
        .with_data("0011223344556677")
        .with_le("00");
    let wire = original.to_hex().unwrap();
    let parsed = ApduCommand::parse(&wire).unwrap();
    assert_eq!(parsed, original);
}

#[test]
fn test_response_decode_status_only() {
    let resp = ApduResponse::parse("9000").unwrap();
    assert_eq!(resp.data, "");
    assert!(resp.is_success());
    assert_eq!(resp.status_message(), "Success");
}

#[test]
fn test_response_decode_with_payload() {
    let resp = ApduResponse::parse("0102030461AF").unwrap();
    assert_eq!(resp.data, "01020304");
    assert_eq!(resp.status_word(), "61AF");
    assert!(!resp.is_success());
}

#[test]
fn test_response_rejects_too_short() {
    assert!(matches!(
        ApduResponse::parse("90"),
        Err(ApduError::ResponseTooShort(2))
    ));
}

#[test]
fn test_status_message_table() {
    assert_eq!(status_message("9000"), "Success");
    assert_eq!(status_message("6A82"), "File not found");
    assert_eq!(status_message("6982"), "Security status not satisfied");
    // Prefix families
    assert_eq!(status_message("6110"), "More data available");
    assert_eq!(status_message("6C08"), "Wrong Le field");
    assert_eq!(status_message("1234"), "Unknown status word");
}
