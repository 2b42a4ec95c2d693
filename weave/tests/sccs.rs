//! Black-box exercise of the codec + weave reconstruction against a hand-built three-delta
//! history file: a root revision, a trunk delta that appends a line, and a branch off of the
//! root that edits a different line.

use sccs_weave::{
    BodyLine, Ctrl, Date, Delta, DeltaKind, DeltaTable, Flags, Header, HistoryCodec, SeqSet,
    SeqState, Sid, WeaveReader,
};

fn delta(sid: Sid, seq: u32, prev: u32, inserted: u32, deleted: u32, unchanged: u32) -> Delta {
    Delta {
        kind: DeltaKind::Delta,
        sid,
        date: Date::parse("24/06/01 12:00:00").unwrap(),
        user: "tester".to_string(),
        seq,
        prev_seq: prev,
        inserted,
        deleted,
        unchanged,
        included: SeqSet::absent(),
        excluded: SeqSet::absent(),
        ignored: SeqSet::absent(),
        mrs: Vec::new(),
        comments: vec!["test delta".to_string()],
    }
}

/// Builds the weave for:
///   1.1: hello / world
///   1.2: hello / there / world   (insert "there" before "world")
///   1.1.1.1 (branched off 1.1): HI / world   (delete "hello", insert "HI")
fn build() -> (DeltaTable, Vec<BodyLine>) {
    let table = DeltaTable::from_deltas(vec![
        delta(Sid::branch(1, 1, 1, 1), 3, 1, 1, 1, 1),
        delta(Sid::trunk(1, 2), 2, 1, 1, 0, 2),
        delta(Sid::trunk(1, 1), 1, 0, 2, 0, 0),
    ]);

    let body = vec![
        BodyLine::Control(Ctrl::Insert, 1),
        BodyLine::Control(Ctrl::Delete, 3),
        BodyLine::Data(b"hello".to_vec()),
        BodyLine::Control(Ctrl::End, 3),
        BodyLine::Control(Ctrl::Insert, 3),
        BodyLine::Data(b"HI".to_vec()),
        BodyLine::Control(Ctrl::End, 3),
        BodyLine::Control(Ctrl::Insert, 2),
        BodyLine::Data(b"there".to_vec()),
        BodyLine::Control(Ctrl::End, 2),
        BodyLine::Data(b"world".to_vec()),
        BodyLine::Control(Ctrl::End, 1),
    ];

    (table, body)
}

fn write_history(table: &DeltaTable, body: Vec<BodyLine>) -> (tempdir::TempDir, std::path::PathBuf) {
    let dir = tempdir::TempDir::new("sccs-sccs-test").unwrap();
    let path = dir.path().join("s.greeting");
    let tmp = dir.path().join("x.greeting");
    let header =
        Header { delta_table: table.clone(), users: vec![], flags: Flags::new(), comments: vec![] };
    HistoryCodec::write(&path, &tmp, &header, body).unwrap();
    (dir, path)
}

#[test]
fn extracts_root_revision() {
    let (table, body) = build();
    let (_dir, path) = write_history(&table, body);
    let (header, _cksum, cursor) = HistoryCodec::read(&path).unwrap();
    let state = SeqState::for_target(&header.delta_table, 1, &[], &[], false).unwrap();
    let (lines, _stats) = WeaveReader::new(cursor, &state).extract_lines().unwrap();
    assert_eq!(lines, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[test]
fn extracts_trunk_delta() {
    let (table, body) = build();
    let (_dir, path) = write_history(&table, body);
    let (header, _cksum, cursor) = HistoryCodec::read(&path).unwrap();
    let state = SeqState::for_target(&header.delta_table, 2, &[], &[], false).unwrap();
    let (lines, stats) = WeaveReader::new(cursor, &state).extract_lines().unwrap();
    assert_eq!(lines, vec![b"hello".to_vec(), b"there".to_vec(), b"world".to_vec()]);
    assert_eq!(stats.emitted, 3);
}

#[test]
fn extracts_branch_delta() {
    let (table, body) = build();
    let (_dir, path) = write_history(&table, body);
    let (header, _cksum, cursor) = HistoryCodec::read(&path).unwrap();
    let state = SeqState::for_target(&header.delta_table, 3, &[], &[], false).unwrap();
    let (lines, _stats) = WeaveReader::new(cursor, &state).extract_lines().unwrap();
    assert_eq!(lines, vec![b"HI".to_vec(), b"world".to_vec()]);
}

#[test]
fn checksum_round_trips() {
    let (table, body) = build();
    let (_dir, path) = write_history(&table, body);
    HistoryCodec::verify_checksum(&path).unwrap();
}
