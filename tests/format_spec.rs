//! End-to-end scenarios over synthetic fp3/fp7/fmp12 images.

mod common;

use std::fs;

use common::{collect_values, BlockSpec, Family, FileBuilder, Payload};
use fmp_reader::{ColumnType, FmpError, FmpFile, FmpVersion, HandlerStatus};
use tempfile::tempdir;

fn v7_people_file() -> Vec<u8> {
    FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"People")
                .v7_column_def(1, 1, b"Name")
                .v7_column_def(1, 2, b"City"),
        )
        .block(
            Payload::new()
                .v7_value(1, 1, 1, b"Alice")
                .v7_value(1, 1, 2, b"Oslo")
                .v7_value(1, 2, 1, b"Bob")
                .v7_value(1, 2, 2, b"Lima"),
        )
        .build()
}

#[test]
fn fp7_header_parameters() {
    let mut file = FmpFile::open_buffer(v7_people_file()).expect("open");
    assert_eq!(file.version(), FmpVersion::V7);
    assert_eq!(file.sector_size(), 4096);
    assert_eq!(file.xor_mask(), 0x5A);
    assert_eq!(file.version_string(), "Pro 7.0");
    assert_eq!(
        file.version_date().map(|d| d.to_string()).as_deref(),
        Some("2019-12-06")
    );

    let metadata = file.discover_all_metadata().expect("metadata");
    assert_eq!(metadata.tables.len(), 1);
    let table = &metadata.tables[0];
    assert_eq!(table.index, 1);
    assert_eq!(table.name, "People");
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Name", "City"]);
}

#[test]
fn fmp12_version_marker() {
    let bytes = FileBuilder::new(Family::V12)
        .block(Payload::new().v7_table_def(1, b"T"))
        .build();
    let file = FmpFile::open_buffer(bytes).expect("open");
    assert_eq!(file.version(), FmpVersion::V12);
    assert_eq!(file.sector_size(), 4096);
    assert_eq!(file.xor_mask(), 0x5A);
}

#[test]
fn bad_magic_is_rejected() {
    let err = FmpFile::open_buffer(vec![0u8; 2048]).unwrap_err();
    assert!(matches!(err, FmpError::BadMagic));
}

#[test]
fn short_file_is_a_read_error() {
    let err = FmpFile::open_buffer(vec![0u8; 100]).unwrap_err();
    assert!(matches!(err, FmpError::Read(_)));
}

#[test]
fn wrong_sector_count_is_rejected() {
    let mut bytes = v7_people_file();
    // Corrupt the super block's next_id (sector 1, next link at offset 8).
    bytes[4096 + 8..4096 + 12].copy_from_slice(&9u32.to_be_bytes());
    let err = FmpFile::open_buffer(bytes).unwrap_err();
    assert!(matches!(err, FmpError::BadSectorCount));
}

#[test]
fn empty_chain_has_no_tables() {
    let bytes = FileBuilder::new(Family::V7).build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    assert_eq!(file.num_blocks(), 1);
    assert!(file.list_tables().expect("tables").is_empty());
}

#[test]
fn rows_and_values_stream_in_order() {
    let mut file = FmpFile::open_buffer(v7_people_file()).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(
        values,
        [
            (1, 1, 1, "Alice".to_string()),
            (1, 1, 2, "Oslo".to_string()),
            (1, 2, 1, "Bob".to_string()),
            (1, 2, 2, "Lima".to_string()),
        ]
    );
}

#[test]
fn interleaved_tables_stay_monotone_per_table() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"A")
                .v7_table_def(2, b"B")
                .v7_column_def(1, 1, b"a")
                .v7_column_def(2, 1, b"b"),
        )
        .block(
            Payload::new()
                .v7_value(1, 1, 1, b"a1")
                .v7_value(2, 1, 1, b"b1")
                .v7_value(1, 2, 1, b"a2")
                .v7_value(2, 2, 1, b"b2"),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);

    for table in [1usize, 2] {
        let rows: Vec<u64> = values
            .iter()
            .filter(|(t, ..)| *t == table)
            .map(|(_, row, ..)| *row)
            .collect();
        assert!(
            rows.windows(2).all(|w| w[0] <= w[1]),
            "table {} rows not monotone: {:?}",
            table,
            rows
        );
    }
    assert_eq!(values.len(), 4);
}

#[test]
fn data_segment_chunks_carry_values() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a")
                .v7_column_def(1, 2, b"b"),
        )
        .block(
            Payload::new()
                .push(129)
                .push(5)
                .push(1)
                .data_segment(2, b"segmented")
                .pop_n(3),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 2, "segmented".to_string())]);
}

#[test]
fn sparse_column_indices_compact_but_keep_indices() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a")
                .v7_column_def(1, 2, b"b")
                .v7_column_def(1, 5, b"c")
                .v7_column_def(1, 128, b"d"),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let table = metadata.table_by_index(1).expect("table");
    let indices: Vec<usize> = table.columns.iter().map(|c| c.index).collect();
    assert_eq!(indices, [1, 2, 5, 128]);
}

#[test]
fn tables_with_gaps_compact_preserving_indices() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(2, b"Second")
                .v7_table_def(7, b"Seventh")
                .v7_column_def(2, 1, b"x")
                .v7_column_def(7, 1, b"y"),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let indices: Vec<usize> = metadata.tables.iter().map(|t| t.index).collect();
    assert_eq!(indices, [2, 7]);
    assert_eq!(metadata.tables[0].name, "Second");
    assert_eq!(metadata.tables[1].name, "Seventh");
}

#[test]
fn metadata_scan_stops_past_metadata_region() {
    // A block addressed between path 3 and 128 ends the metadata pass;
    // a table defined after it stays invisible.
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"Early")
                .v7_column_def(1, 1, b"a"),
        )
        .block(Payload::new().push(10).field_ref(1, b"x").pop())
        .block(Payload::new().v7_table_def(2, b"Late"))
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let names: Vec<&str> = metadata.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Early"]);
}

#[test]
fn skipped_tables_emit_no_values() {
    let mut file = FmpFile::open_buffer(v7_people_file()).expect("open");
    let mut metadata = file.discover_all_metadata().expect("metadata");
    metadata.tables[0].skip = true;
    let values = collect_values(&mut file, &metadata);
    assert!(values.is_empty());
}

#[test]
fn abort_from_handler_surfaces_user_aborted() {
    let mut file = FmpFile::open_buffer(v7_people_file()).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let mut seen = 0;
    let err = file
        .read_all_values(&metadata, |_, _, _, _| {
            seen += 1;
            HandlerStatus::Abort
        })
        .unwrap_err();
    assert!(matches!(err, FmpError::UserAborted));
    assert_eq!(seen, 1);
}

#[test]
fn deleted_blocks_keep_the_chain_but_emit_nothing() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a"),
        )
        .block_spec(BlockSpec {
            next_id: None,
            deleted: true,
            payload: Payload::new().v7_value(1, 1, 1, b"ghost").into_bytes(),
        })
        .block(Payload::new().v7_value(1, 1, 1, b"real"))
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "real".to_string())]);
}

#[test]
fn looping_chain_terminates_after_one_visit_each() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a"),
        )
        .block(Payload::new().v7_value(1, 1, 1, b"once"))
        .block_spec(BlockSpec {
            // Points back at ordinal 2: the traversal must stop, not spin.
            next_id: Some(2),
            deleted: false,
            payload: Payload::new().v7_value(1, 2, 1, b"twice").into_bytes(),
        })
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(
        values,
        [(1, 1, 1, "once".to_string()), (1, 2, 1, "twice".to_string())]
    );
}

#[test]
fn long_strings_flush_on_column_change_and_at_end() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a")
                .v7_column_def(1, 2, b"notes")
                .v7_column_def(1, 3, b"tag"),
        )
        .block(
            Payload::new()
                .v7_value(1, 1, 1, b"Alice")
                // Long string on column 2, two fragments.
                .push(129)
                .push(5)
                .push(1)
                .push(2)
                .field_ref(1, b"Hello ")
                .field_ref(1, b"World")
                .pop_n(4)
                // Column change flushes the buffer before this value.
                .v7_value(1, 1, 3, b"x")
                // Trailing long string on column 2 of row 2, flushed at end.
                .push(129)
                .push(5)
                .push(2)
                .push(2)
                .field_ref(1, b"Tail")
                .pop_n(4),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(
        values,
        [
            (1, 1, 1, "Alice".to_string()),
            (1, 1, 2, "Hello World".to_string()),
            (1, 1, 3, "x".to_string()),
            (1, 2, 2, "Tail".to_string()),
        ]
    );
}

#[test]
fn long_strings_reassemble_across_blocks() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a"),
        )
        .block(
            Payload::new()
                .push(129)
                .push(5)
                .push(1)
                .push(1)
                .field_ref(1, b"first-")
                .pop_n(4),
        )
        .block(
            Payload::new()
                .push(129)
                .push(5)
                .push(1)
                .push(1)
                .field_ref(1, b"second")
                .pop_n(4),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "first-second".to_string())]);
}

#[test]
fn rich_text_formatting_runs_are_dropped() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a"),
        )
        .block(
            Payload::new()
                .push(129)
                .push(5)
                .push(1)
                .push(1)
                // ref_simple 0 inside a long-string path is formatting data.
                .field_ref(0, &[0x01, 0x02, 0x03])
                .field_ref(1, b"plain")
                .pop_n(4),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "plain".to_string())]);
}

#[test]
fn metadata_sentinel_ref_is_never_a_column() {
    let mut defs = Payload::new().v7_table_def(1, b"Wide");
    let mut block2 = Payload::new();
    for column in 1..=252u64 {
        let name = format!("c{}", column);
        if column <= 200 {
            defs = defs.v7_column_def(1, column, name.as_bytes());
        } else {
            block2 = block2.v7_column_def(1, column, name.as_bytes());
        }
    }
    let bytes = FileBuilder::new(Family::V7)
        .block(defs)
        .block(block2)
        .block(
            Payload::new()
                .push(129)
                .push(5)
                .push(1)
                .field_ref(252, b"no")
                .field_ref(5, b"yes")
                .pop_n(3),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    assert_eq!(metadata.tables[0].columns.len(), 252);
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 5, "yes".to_string())]);
}

#[test]
fn out_of_range_column_refs_are_skipped() {
    let mut file = FmpFile::open_buffer(
        FileBuilder::new(Family::V7)
            .block(
                Payload::new()
                    .v7_table_def(1, b"T")
                    .v7_column_def(1, 1, b"a"),
            )
            .block(
                Payload::new()
                    .v7_value(1, 1, 9, b"nope")
                    .v7_value(1, 1, 1, b"ok"),
            )
            .build(),
    )
    .expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "ok".to_string())]);
}

#[test]
fn truncated_trailing_chunks_are_ignored() {
    // Pre-v7 payloads carry an explicit length, so a chunk can genuinely
    // run off the end of one.
    let bytes = FileBuilder::new(Family::V5)
        .block(Payload::new().pre_v7_column_def(1, b"a"))
        .block(
            Payload::new()
                .noop()
                .pre_v7_value(1, 1, b"kept")
                // A field ref whose declared length runs past the payload.
                .raw(&[0x06, 0x01, 0xF0]),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "kept".to_string())]);
}

#[test]
fn scsu_text_decodes_in_values() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"T")
                .v7_column_def(1, 1, b"a"),
        )
        .block(Payload::new().v7_value(1, 1, 1, b"Caf\xE9"))
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let metadata = file.discover_all_metadata().expect("metadata");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(values, [(1, 1, 1, "Café".to_string())]);
}

#[test]
fn fp3_synthesizes_table_from_filename() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("Contacts.fp3");
    let bytes = FileBuilder::new(Family::V3)
        .block(
            Payload::new()
                .pre_v7_column_def(1, b"Name")
                // Type/collation record: type byte 5 (container), collation 3.
                .push(3)
                .push(5)
                .push(2)
                .field_ref(1, b"Kind")
                .field_ref(2, &[0, 5, 0, 3])
                .pop_n(3),
        )
        .block(
            Payload::new()
                .pre_v7_value(1, 1, b"Alice")
                .pre_v7_value(1, 2, b"Box")
                .pre_v7_value(2, 1, b"Bob"),
        )
        .build();
    fs::write(&path, &bytes).expect("write");

    let mut file = FmpFile::open(&path).expect("open");
    assert_eq!(file.version(), FmpVersion::V3);
    assert_eq!(file.sector_size(), 1024);
    assert_eq!(file.xor_mask(), 0);

    let metadata = file.discover_all_metadata().expect("metadata");
    assert_eq!(metadata.tables.len(), 1);
    let table = &metadata.tables[0];
    assert_eq!(table.index, 1);
    assert_eq!(table.name, "Contacts");

    let kind = table.column_by_index(2).expect("column 2");
    assert_eq!(kind.name, "Kind");
    assert_eq!(kind.ty, ColumnType::Container);
    assert_eq!(kind.collation, 3);

    let values = collect_values(&mut file, &metadata);
    assert_eq!(
        values,
        [
            (1, 1, 1, "Alice".to_string()),
            (1, 1, 2, "Box".to_string()),
            (1, 2, 1, "Bob".to_string()),
        ]
    );
}

#[test]
fn pre_v7_long_strings_reassemble() {
    let bytes = FileBuilder::new(Family::V5)
        .block(
            Payload::new()
                .pre_v7_column_def(1, b"Name")
                .pre_v7_column_def(2, b"Notes"),
        )
        .block(
            Payload::new()
                .pre_v7_value(1, 1, b"Ana")
                .push(5)
                .push(1)
                .push(2)
                .field_ref(1, b"Long ")
                .field_ref(1, b"text")
                .pop_n(3),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    assert_eq!(file.version(), FmpVersion::V5);
    let metadata = file.discover_all_metadata().expect("metadata");
    // Buffer opens have no filename; the synthesized table name is empty.
    assert_eq!(metadata.tables[0].name, "");
    let values = collect_values(&mut file, &metadata);
    assert_eq!(
        values,
        [
            (1, 1, 1, "Ana".to_string()),
            (1, 1, 2, "Long text".to_string()),
        ]
    );
}

#[test]
fn stream_mapped_and_buffer_backends_agree() {
    let bytes = v7_people_file();
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("people.fp7");
    fs::write(&path, &bytes).expect("write");

    let mut streamed = FmpFile::open(&path).expect("open stream");
    let mut mapped = FmpFile::open_mapped(&path).expect("open mapped");
    let mut buffered = FmpFile::open_buffer(bytes).expect("open buffer");

    let m1 = streamed.discover_all_metadata().expect("metadata");
    let m2 = mapped.discover_all_metadata().expect("metadata");
    let m3 = buffered.discover_all_metadata().expect("metadata");

    let shape = |m: &fmp_reader::Metadata| {
        m.tables
            .iter()
            .map(|t| {
                (
                    t.index,
                    t.name.clone(),
                    t.columns
                        .iter()
                        .map(|c| (c.index, c.name.clone()))
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&m1), shape(&m2));
    assert_eq!(shape(&m1), shape(&m3));

    let v1 = collect_values(&mut streamed, &m1);
    let v2 = collect_values(&mut mapped, &m2);
    let v3 = collect_values(&mut buffered, &m3);
    assert_eq!(v1, v2);
    assert_eq!(v1, v3);
}

#[test]
fn read_values_restricts_to_one_table() {
    let bytes = FileBuilder::new(Family::V7)
        .block(
            Payload::new()
                .v7_table_def(1, b"A")
                .v7_table_def(2, b"B")
                .v7_column_def(1, 1, b"a")
                .v7_column_def(2, 1, b"b"),
        )
        .block(
            Payload::new()
                .v7_value(1, 1, 1, b"a1")
                .v7_value(2, 1, 1, b"b1"),
        )
        .build();
    let mut file = FmpFile::open_buffer(bytes).expect("open");
    let tables = file.list_tables().expect("tables");
    let b = tables.iter().find(|t| t.name == "B").expect("table B");

    let mut seen = Vec::new();
    file.read_values(b, |row, column, value| {
        seen.push((row, column.index, value.to_string()));
        HandlerStatus::Continue
    })
    .expect("read_values");
    assert_eq!(seen, [(1, 1, "b1".to_string())]);
}

#[test]
fn list_columns_matches_discovered_metadata() {
    let mut file = FmpFile::open_buffer(v7_people_file()).expect("open");
    let tables = file.list_tables().expect("tables");
    let columns = file.list_columns(&tables[0]).expect("columns");
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Name", "City"]);
}
