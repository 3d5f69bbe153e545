use flatfs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use flatfs::{ErrorKind, FlatFs, OpenMode, BLOCK_COUNT, BLOCK_SIZE, MAX_FILE_SIZE, NUM_DIRECT};

fn fresh_fs() -> FlatFs<FileBlockEmulator> {
    let fd = tempfile::tempfile().unwrap();
    let dev = FileBlockEmulatorBuilder::from(fd)
        .with_block_count(BLOCK_COUNT)
        .build()
        .expect("could not initialize disk emulator");
    FlatFs::format(dev).unwrap()
}

#[test]
fn hello_round_trip() {
    let mut fs = fresh_fs();

    let mut h = fs.create("a").unwrap();
    assert_eq!(fs.write(&mut h, b"hello").unwrap(), 5);
    fs.close(&mut h).unwrap();

    let mut h = fs.open("a", OpenMode::ReadOnly).unwrap();
    assert_eq!(fs.length(&h), 5);
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    fs.close(&mut h).unwrap();

    fs.delete("a").unwrap();
    assert!(!fs.exists("a").unwrap());
}

#[test]
fn delete_returns_every_owned_block() {
    let mut fs = fresh_fs();
    let baseline = fs.free_data_blocks();

    // Spilling two blocks past the direct range costs 13 direct blocks, the
    // indirect block itself, and 2 indirect-referenced blocks: 16 in total.
    let mut h = fs.create("big").unwrap();
    let data = vec![0xA5u8; (NUM_DIRECT + 2) * BLOCK_SIZE];
    assert_eq!(fs.write(&mut h, &data).unwrap(), data.len());
    fs.close(&mut h).unwrap();
    assert_eq!(fs.free_data_blocks(), baseline - (NUM_DIRECT + 1 + 2));

    fs.delete("big").unwrap();
    assert_eq!(fs.free_data_blocks(), baseline);
    assert!(!fs.exists("big").unwrap());
}

#[test]
fn contents_survive_remount() {
    let tf = tempfile::NamedTempFile::new().unwrap();
    let dev = FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
        .with_block_count(BLOCK_COUNT)
        .build()
        .unwrap();

    let mut fs = FlatFs::format(dev).unwrap();
    let mut h = fs.create("persistent").unwrap();
    fs.write(&mut h, b"still here").unwrap();
    fs.close(&mut h).unwrap();
    drop(fs);

    // Reattach to the same medium without wiping it.
    let dev = FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
        .with_block_count(BLOCK_COUNT)
        .clear_medium(false)
        .build()
        .unwrap();
    let mut fs = FlatFs::mount(dev).unwrap();

    assert!(fs.exists("persistent").unwrap());
    let mut h = fs.open("persistent", OpenMode::ReadOnly).unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), 10);
    assert_eq!(&buf, b"still here");
    fs.close(&mut h).unwrap();
}

#[test]
fn open_disk_attaches_to_existing_image() {
    let tf = tempfile::NamedTempFile::new().unwrap();
    let dev = FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
        .with_block_count(BLOCK_COUNT)
        .build()
        .unwrap();

    let mut fs = FlatFs::format(dev).unwrap();
    let mut h = fs.create("imaged").unwrap();
    fs.write(&mut h, b"xyz").unwrap();
    fs.close(&mut h).unwrap();
    drop(fs);

    let dev = FileBlockEmulator::open_disk(tf.path(), BLOCK_COUNT).unwrap();
    let mut fs = FlatFs::mount(dev).unwrap();
    assert!(fs.exists("imaged").unwrap());
}

#[test]
fn writes_crossing_block_boundaries_preserve_neighbors() {
    let mut fs = fresh_fs();

    let mut h = fs.create("spans").unwrap();
    let base: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    fs.write(&mut h, &base).unwrap();

    // Overwrite a window straddling the first block boundary.
    fs.seek(&mut h, BLOCK_SIZE - 100).unwrap();
    fs.write(&mut h, &[0xEE; 200]).unwrap();

    let mut expect = base.clone();
    expect[BLOCK_SIZE - 100..BLOCK_SIZE + 100].copy_from_slice(&[0xEE; 200]);

    fs.seek(&mut h, 0).unwrap();
    let mut buf = vec![0u8; 3 * BLOCK_SIZE];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), 3 * BLOCK_SIZE);
    assert_eq!(buf, expect);
    fs.close(&mut h).unwrap();
}

#[test]
fn file_grows_to_maximum_size_and_no_further() {
    let mut fs = fresh_fs();

    let mut h = fs.create("maxed").unwrap();
    let data = vec![0x3Cu8; MAX_FILE_SIZE];
    assert_eq!(fs.write(&mut h, &data).unwrap(), MAX_FILE_SIZE);
    assert_eq!(fs.length(&h), MAX_FILE_SIZE);

    let err = fs.write(&mut h, &[0u8; 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExceedsMaxFileSize);
    assert_eq!(fs.length(&h), MAX_FILE_SIZE);

    // Every byte of the full-size file reads back.
    fs.seek(&mut h, 0).unwrap();
    let mut buf = vec![0u8; MAX_FILE_SIZE];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), MAX_FILE_SIZE);
    assert!(buf.iter().all(|&b| b == 0x3C));
    fs.close(&mut h).unwrap();
}

#[test]
fn out_of_space_mid_write_keeps_persisted_prefix() {
    let mut fs = fresh_fs();
    let baseline = fs.free_data_blocks();

    // Leave less than one max-size file's worth of free blocks.
    let mut filler = fs.create("filler").unwrap();
    let big = vec![0x11u8; MAX_FILE_SIZE];
    assert_eq!(fs.write(&mut filler, &big).unwrap(), MAX_FILE_SIZE);
    fs.close(&mut filler).unwrap();

    let mut h = fs.create("squeezed").unwrap();
    let free = fs.free_data_blocks();
    // One remaining block becomes the indirect table, the rest hold data;
    // the block allocated at create time makes up the difference.
    let expected = free * BLOCK_SIZE;
    assert!(expected < MAX_FILE_SIZE);

    let err = fs.write(&mut h, &vec![0x5Au8; MAX_FILE_SIZE]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfSpace);
    assert_eq!(fs.length(&h), expected);
    assert_eq!(fs.free_data_blocks(), 0);

    // The prefix written before the zone ran dry is persisted and intact.
    fs.seek(&mut h, 0).unwrap();
    let mut buf = vec![0u8; expected + BLOCK_SIZE];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), expected);
    assert!(buf[..expected].iter().all(|&b| b == 0x5A));
    fs.close(&mut h).unwrap();

    // Deleting both files hands the whole data zone back.
    fs.delete("squeezed").unwrap();
    fs.delete("filler").unwrap();
    assert_eq!(fs.free_data_blocks(), baseline);
}

#[test]
fn deleting_an_open_file_is_rejected() {
    let mut fs = fresh_fs();

    let mut h = fs.create("busy").unwrap();
    let err = fs.delete("busy").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileOpen);

    fs.close(&mut h).unwrap();
    fs.delete("busy").unwrap();
    assert!(!fs.exists("busy").unwrap());
}

#[test]
fn deleted_slot_is_reused_first_fit() {
    let mut fs = fresh_fs();

    let mut a = fs.create("a").unwrap();
    let mut b = fs.create("b").unwrap();
    fs.close(&mut a).unwrap();
    fs.close(&mut b).unwrap();

    fs.delete("a").unwrap();

    // The freed slot (and its data block) is the first fit for the next file.
    let free_before = fs.free_data_blocks();
    let mut c = fs.create("c").unwrap();
    fs.close(&mut c).unwrap();
    assert_eq!(fs.free_data_blocks(), free_before - 1);
    assert!(fs.exists("b").unwrap());
    assert!(fs.exists("c").unwrap());
}

#[test]
fn reads_past_end_of_file_are_truncated() {
    let mut fs = fresh_fs();

    let mut h = fs.create("small").unwrap();
    fs.write(&mut h, b"0123456789").unwrap();
    fs.seek(&mut h, 7).unwrap();

    let mut buf = [0u8; 64];
    assert_eq!(fs.read(&mut h, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"789");
    fs.close(&mut h).unwrap();
}
