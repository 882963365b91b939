use brightchain::store::handle::TUPLE_SIZE;
use brightchain::{
    calculate_checksum, decrypt_block, encrypt_into_block, Block, BlockDataType, BlockError,
    BlockHandleTuple, BlockMetadata, BlockOptions, BlockSize, BlockType, CblBlock,
    DiskBlockStore, Member, QuorumError, StoreError, TupleError, ECIES_OVERHEAD,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use tempfile::TempDir;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

fn store(dir: &TempDir) -> DiskBlockStore {
    DiskBlockStore::new(dir.path(), BlockSize::Small).unwrap()
}

// ── Block framing ────────────────────────────────────────────────────────────

#[test]
fn round_trip_small_encrypted_block() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    // An empty plaintext produces exactly the 97-byte envelope header.
    let member = Member::generate();
    let block = encrypt_into_block(&member.public_key, BlockSize::Small, &[], None).unwrap();
    assert_eq!(block.layer_header_data().len(), ECIES_OVERHEAD);
    assert_eq!(block.data().len(), BlockSize::Small.len());
    assert_eq!(*block.checksum(), calculate_checksum(block.data()));

    let handle = store.set_data(&block).unwrap();
    let fetched = store.get(block.checksum());
    fetched.validate().unwrap();
    assert_eq!(fetched.checksum(), handle.checksum());

    let plaintext = decrypt_block(&block, member.private_key().unwrap()).unwrap();
    assert!(plaintext.is_empty());
}

#[test]
fn detects_corruption_via_supplied_checksum() {
    let data = random_bytes(BlockSize::Small.len());
    let block = Block::new(
        BlockType::RawData,
        BlockDataType::RawData,
        BlockSize::Small,
        &data,
        BlockOptions::default(),
    )
    .unwrap();
    let expected = *block.checksum();

    let mut corrupted = data.clone();
    corrupted[0] ^= 0xFF;
    let err = Block::new(
        BlockType::RawData,
        BlockDataType::RawData,
        BlockSize::Small,
        &corrupted,
        BlockOptions { checksum: Some(expected), ..BlockOptions::default() },
    )
    .unwrap_err();
    match err {
        BlockError::ChecksumMismatch { expected: e, computed: c } => {
            assert_eq!(e, expected);
            assert_ne!(c, expected);
        }
        other => panic!("expected ChecksumMismatch, got {other:?}"),
    }
}

#[test]
fn rejects_future_creation_date() {
    let err = Block::new(
        BlockType::RawData,
        BlockDataType::RawData,
        BlockSize::Small,
        b"hello",
        BlockOptions {
            date_created: Some(Utc::now() + Duration::days(1)),
            ..BlockOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, BlockError::FutureCreationDate(_)));
}

#[test]
fn rejects_oversize_data() {
    let err = Block::new(
        BlockType::RawData,
        BlockDataType::RawData,
        BlockSize::Small,
        &random_bytes(BlockSize::Small.len() + 1),
        BlockOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BlockError::DataLengthExceedsCapacity { .. }));
}

#[test]
fn identical_payloads_get_distinct_addresses() {
    let make = || {
        Block::new(
            BlockType::RawData,
            BlockDataType::RawData,
            BlockSize::Small,
            b"same short payload",
            BlockOptions::default(),
        )
        .unwrap()
    };
    let a = make();
    let b = make();
    // Payload prefixes agree; random padding makes the addresses diverge.
    assert_eq!(&a.data()[..18], &b.data()[..18]);
    assert_ne!(a.checksum(), b.checksum());
}

// ── Store ────────────────────────────────────────────────────────────────────

#[test]
fn set_then_get_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let block = Block::random(BlockSize::Small);

    assert!(!store.has(block.checksum()));
    store.set_data(&block).unwrap();
    assert!(store.has(block.checksum()));

    let fetched = store.get_data(block.checksum()).unwrap();
    assert_eq!(fetched.data(), block.data());
    assert_eq!(fetched.checksum(), block.checksum());
    assert_eq!(fetched.block_type(), BlockType::Random);
}

#[test]
fn second_write_of_same_key_fails() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let block = Block::random(BlockSize::Small);

    store.set_data(&block).unwrap();
    let err = store.set_data(&block).unwrap_err();
    assert!(matches!(err, StoreError::BlockPathAlreadyExists(_)));
}

#[test]
fn get_data_of_missing_key_fails() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let absent = calculate_checksum(b"never stored");
    assert!(matches!(
        store.get_data(&absent),
        Err(StoreError::KeyNotFound(_))
    ));
}

#[test]
fn wrong_size_block_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let tiny = Block::random(BlockSize::Tiny);
    assert!(matches!(
        store.set_data(&tiny),
        Err(StoreError::BlockSizeMismatch { .. })
    ));
}

#[test]
fn handle_validation_detects_on_disk_corruption() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let block = Block::random(BlockSize::Small);
    let handle = store.set_data(&block).unwrap();

    let mut bytes = std::fs::read(handle.path()).unwrap();
    bytes[100] ^= 0x01;
    std::fs::write(handle.path(), &bytes).unwrap();

    assert!(handle.validate().is_err());
}

#[test]
fn random_sampling_skips_sidecars_and_dedupes() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let mut stored = std::collections::HashSet::new();
    for _ in 0..8 {
        let block = Block::random(BlockSize::Small);
        store.set_data(&block).unwrap();
        stored.insert(*block.checksum());
    }

    let sampled = store.random_checksums(20).unwrap();
    assert_eq!(sampled.len(), 8); // fewer than requested, never padded out
    for checksum in &sampled {
        assert!(stored.contains(checksum));
    }
    let unique: std::collections::HashSet<_> = sampled.iter().collect();
    assert_eq!(unique.len(), sampled.len());
}

// ── XOR pipeline ─────────────────────────────────────────────────────────────

#[test]
fn xor_round_trip_recovers_original() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let a = Block::random(BlockSize::Small);
    let b = Block::random(BlockSize::Small);
    let c = Block::random(BlockSize::Small);
    let ha = store.set_data(&a).unwrap();
    let hb = store.set_data(&b).unwrap();
    let hc = store.set_data(&c).unwrap();

    let tuple = BlockHandleTuple::new(vec![ha, hb.clone(), hc.clone()]).unwrap();
    assert!(tuple.verify());
    let hr = tuple
        .xor_to_store(&store, BlockMetadata::now(BlockSize::Small.len() as u64))
        .unwrap();

    // XOR(R, B, C) == A, bytewise and by address.
    let back = BlockHandleTuple::new(vec![hr, hb, hc]).unwrap();
    let recovered = store
        .xor(back.handles(), BlockMetadata::now(BlockSize::Small.len() as u64))
        .unwrap();
    assert_eq!(recovered.data(), a.data());
    assert_eq!(recovered.checksum(), a.checksum());
}

#[test]
fn tuple_rejects_wrong_arity_and_mixed_sizes() {
    let dir = TempDir::new().unwrap();
    let small = store(&dir);
    let tiny = DiskBlockStore::new(dir.path(), BlockSize::Tiny).unwrap();

    let h1 = small.set_data(&Block::random(BlockSize::Small)).unwrap();
    let h2 = small.set_data(&Block::random(BlockSize::Small)).unwrap();
    let h3 = tiny.set_data(&Block::random(BlockSize::Tiny)).unwrap();

    assert!(matches!(
        BlockHandleTuple::new(vec![h1.clone(), h2.clone()]),
        Err(TupleError::InvalidTupleSize { expected: TUPLE_SIZE, actual: 2 })
    ));
    assert!(matches!(
        BlockHandleTuple::new(vec![h1, h2, h3]),
        Err(TupleError::BlockSizeMismatch)
    ));
}

#[test]
fn whitening_tuple_reconstructs_source() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let source = Block::new(
        BlockType::RawData,
        BlockDataType::RawData,
        BlockSize::Small,
        b"owner-free payload",
        BlockOptions::default(),
    )
    .unwrap();
    let (_, addresses) = store.whiten(&source).unwrap();
    assert_eq!(addresses.len(), TUPLE_SIZE);
    // The source itself is never stored.
    assert!(!store.has(source.checksum()));

    let handles: Vec<_> = addresses.iter().map(|c| store.get(c)).collect();
    let tuple = BlockHandleTuple::new(handles).unwrap();
    let recovered = store
        .xor(tuple.handles(), BlockMetadata::now(BlockSize::Small.len() as u64))
        .unwrap();
    assert_eq!(recovered.data(), source.data());
}

// ── Constituent block lists ──────────────────────────────────────────────────

#[test]
fn cbl_round_trips_through_store() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let creator = Member::generate();

    let addresses: Vec<_> = (0..5)
        .map(|i| calculate_checksum(&[i as u8; 16]))
        .collect();
    let cbl = CblBlock::new(&creator, BlockSize::Small, &addresses, 3 * 4096, 3).unwrap();
    cbl.verify_signature(&creator.public_key).unwrap();

    store.set_data(cbl.block()).unwrap();
    let fetched = store.get_data(cbl.block().checksum()).unwrap();
    assert_eq!(fetched.block_type(), BlockType::ConstituentBlockList);

    let parsed = CblBlock::parse(fetched).unwrap();
    assert_eq!(parsed.addresses(), addresses);
    assert_eq!(parsed.header().original_data_length, 3 * 4096);
    assert_eq!(parsed.header().tuple_size, 3);
    parsed.verify_signature(&creator.public_key).unwrap();

    // A different key must not verify.
    let stranger = Member::generate();
    assert!(parsed.verify_signature(&stranger.public_key).is_err());
}

#[test]
fn extended_cbl_carries_name_and_mime() {
    let creator = Member::generate();
    let addresses = vec![calculate_checksum(b"one"), calculate_checksum(b"two")];
    let cbl = CblBlock::new_extended(
        &creator,
        BlockSize::Small,
        "report.pdf",
        "application/pdf",
        &addresses,
        8192,
        3,
    )
    .unwrap();

    let parsed = CblBlock::parse(cbl.into_block()).unwrap();
    assert_eq!(parsed.file_name(), Some("report.pdf"));
    assert_eq!(parsed.mime_type(), Some("application/pdf"));
    assert_eq!(parsed.addresses(), addresses);
    parsed.verify_signature(&creator.public_key).unwrap();
}

#[test]
fn cbl_rejects_overflow_and_bad_names() {
    let creator = Member::generate();
    let too_many: Vec<_> = (0..CblBlock::address_capacity(BlockSize::Message) + 1)
        .map(|i| calculate_checksum(&i.to_be_bytes()))
        .collect();
    assert!(CblBlock::new(&creator, BlockSize::Message, &too_many, 1, 3).is_err());

    assert!(CblBlock::new_extended(
        &creator,
        BlockSize::Small,
        "evil/../name",
        "text/plain",
        &[],
        0,
        3,
    )
    .is_err());
}

// ── Quorum sealing ───────────────────────────────────────────────────────────

#[test]
fn quorum_two_of_three_round_trips() {
    let agent = Member::generate();
    let members: Vec<_> = (0..3).map(|_| Member::generate()).collect();
    let record = brightchain::seal(&agent, &"hello".to_string(), &members, Some(2)).unwrap();

    let value: String = brightchain::unseal(&record, &members[..2]).unwrap();
    assert_eq!(value, "hello");

    // Order-insensitive above the threshold.
    let reversed: Vec<_> = members.iter().rev().cloned().collect();
    let value: String = brightchain::unseal(&record, &reversed[..2]).unwrap();
    assert_eq!(value, "hello");

    let err = brightchain::unseal::<String>(&record, &members[..1]).unwrap_err();
    assert!(matches!(err, QuorumError::NotEnoughMembersToUnlock { .. }));
}

#[test]
fn quorum_requires_private_keys_and_known_members() {
    let agent = Member::generate();
    let members: Vec<_> = (0..3).map(|_| Member::generate()).collect();
    let record = brightchain::seal(&agent, &42u32, &members, Some(2)).unwrap();

    let stripped = vec![members[0].clone(), members[1].without_private_key()];
    assert!(matches!(
        brightchain::unseal::<u32>(&record, &stripped),
        Err(QuorumError::MissingPrivateKeys(_))
    ));

    let outsider = vec![members[0].clone(), Member::generate()];
    assert!(matches!(
        brightchain::unseal::<u32>(&record, &outsider),
        Err(QuorumError::MemberNotFound(_))
    ));
}

#[test]
fn quorum_record_serializes_canonically() {
    let agent = Member::generate();
    let members: Vec<_> = (0..4).map(|_| Member::generate()).collect();
    let record = brightchain::seal(&agent, &"payload".to_string(), &members, Some(3)).unwrap();

    let json = serde_json::to_string(&record).unwrap();
    let back: brightchain::QuorumDataRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(serde_json::to_string(&back).unwrap(), json);

    let value: String = brightchain::unseal(&back, &members[1..]).unwrap();
    assert_eq!(value, "payload");
}
