#[cfg(test)]
mod tests {
    use crate::persist::state_file::{
        read_state_file, write_state_file, PersistentItem, StateFileError,
    };
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    const SEP: char = '\u{1f}';

    fn sample_items() -> Vec<PersistentItem> {
        vec![
            PersistentItem::new("generator", "id", vec![1, 2, 3, 4]),
            PersistentItem::new("generator", "carryover.seed", vec![0xAA; 64]),
            PersistentItem::new("sources", "network.last", Vec::new()),
            PersistentItem::new("", "bare-key", vec![0xFF]),
        ]
    }

    /// Hand-build a file with the given line terminator and a valid checksum.
    fn build_file(terminator: &str, records: &[&str]) -> Vec<u8> {
        let mut body = String::new();
        for record in records {
            body.push_str(terminator);
            body.push_str(record);
        }
        body.push_str(terminator);

        let checksum = BASE64.encode(Sha256::digest(body.as_bytes()));
        let header = format!(
            "FortunaPoolState{SEP}1{SEP}{checksum}{SEP}{count}",
            count = records.len()
        );
        let mut file = header.into_bytes();
        file.extend_from_slice(body.as_bytes());
        file
    }

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn write_then_read_returns_the_same_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let items = sample_items();
        write_state_file(&path, &items).unwrap();
        assert_eq!(read_state_file(&path).unwrap(), items);
    }

    #[test]
    fn empty_item_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");
        write_state_file(&path, &[]).unwrap();
        assert!(read_state_file(&path).unwrap().is_empty());
    }

    #[test]
    fn rewrite_keeps_the_previous_file_as_old() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let first = vec![PersistentItem::new("ns", "gen", vec![1])];
        let second = vec![PersistentItem::new("ns", "gen", vec![2])];
        write_state_file(&path, &first).unwrap();
        write_state_file(&path, &second).unwrap();

        assert_eq!(read_state_file(&path).unwrap(), second);
        let old = temp_path(&dir, "state.txt.old");
        assert_eq!(read_state_file(&old).unwrap(), first);
    }

    #[test]
    fn crlf_and_bare_cr_terminators_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let record = format!("ns{SEP}key{SEP}{}", BASE64.encode([9u8, 9, 9]));

        for terminator in ["\r\n", "\r", "\n\r\n"] {
            let path = temp_path(&dir, "state.txt");
            std::fs::write(&path, build_file(terminator, &[&record])).unwrap();

            let items = read_state_file(&path).unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].namespace(), "ns");
            assert_eq!(items[0].key(), "key");
            assert_eq!(items[0].value(), &[9, 9, 9]);
        }
    }

    #[test]
    fn corrupted_body_fails_the_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");
        write_state_file(&path, &sample_items()).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 2;
        data[last] ^= 0x01;
        std::fs::write(&path, data).unwrap();

        assert!(matches!(
            read_state_file(&path),
            Err(StateFileError::ChecksumMismatch)
        ));
    }

    #[test]
    fn foreign_file_is_rejected_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");
        std::fs::write(&path, b"something else entirely\nwith lines\n").unwrap();

        assert!(matches!(
            read_state_file(&path),
            Err(StateFileError::BadMagic)
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let file = build_file("\n", &[]);
        let swapped = String::from_utf8(file)
            .unwrap()
            .replacen(&format!("{SEP}1{SEP}"), &format!("{SEP}2{SEP}"), 1);
        std::fs::write(&path, swapped).unwrap();

        assert!(matches!(
            read_state_file(&path),
            Err(StateFileError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn wrong_item_count_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let record = format!("ns{SEP}key{SEP}{}", BASE64.encode([1u8]));
        let mut file = build_file("\n", &[&record]);
        // Bump the announced count from 1 to 2; the checksum only covers the body
        let text = String::from_utf8(file).unwrap();
        let patched = text.replacen(
            &format!("{SEP}1\n"),
            &format!("{SEP}2\n"),
            1,
        );
        file = patched.into_bytes();
        std::fs::write(&path, file).unwrap();

        assert!(matches!(
            read_state_file(&path),
            Err(StateFileError::ItemCountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn truncated_record_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let record = format!("ns{SEP}key-without-value");
        std::fs::write(&path, build_file("\n", &[&record])).unwrap();

        assert!(matches!(
            read_state_file(&path),
            Err(StateFileError::MalformedRecord(1))
        ));
    }

    #[test]
    fn separator_in_a_key_is_rejected_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "state.txt");

        let items = vec![PersistentItem::new("ns", format!("bad{SEP}key"), vec![1])];
        assert!(matches!(
            write_state_file(&path, &items),
            Err(StateFileError::InvalidField(_))
        ));

        let items = vec![PersistentItem::new("bad\nns", "key", vec![1])];
        assert!(matches!(
            write_state_file(&path, &items),
            Err(StateFileError::InvalidField(_))
        ));
    }

    proptest! {
        #[test]
        fn arbitrary_records_round_trip(
            raw in prop::collection::vec(
                ("[A-Za-z0-9._-]{0,12}", "[A-Za-z0-9._-]{0,12}", prop::collection::vec(any::<u8>(), 0..48)),
                0..8,
            )
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.txt");

            let items: Vec<PersistentItem> = raw
                .into_iter()
                .map(|(ns, key, value)| PersistentItem::new(ns, key, value))
                .collect();

            write_state_file(&path, &items).unwrap();
            prop_assert_eq!(read_state_file(&path).unwrap(), items);
        }
    }
}
