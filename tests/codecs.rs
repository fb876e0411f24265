// Golden-vector tests for the format decoders.
//
// Each vector is real compressed output from a reference implementation of
// the format; larger payloads are checked by SHA-256 digest instead of
// inline expected bytes.

use lzkit::compression::{
    lz4, lzbitmap, lzfse, lznt1, lzo, lzvn, lzxpress, lzxpress_huffman, sevenbit,
};
use sha2::{Digest, Sha256};

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ---------------------------------------------------------------------------
// LZ4 block
// ---------------------------------------------------------------------------

#[test]
fn lz4_known_vector() {
    let src = b"\xff\x0cLZ4 compression test string\x1b\x00\xdbPtring";
    assert_eq!(
        lz4::decompress(src, None).unwrap(),
        b"LZ4 compression test string".repeat(10)
    );
}

// ---------------------------------------------------------------------------
// LZNT1
// ---------------------------------------------------------------------------

#[test]
fn lznt1_known_vector() {
    let src = hex::decode(concat!(
        "38b08846232000204720410010a24701a045204400084501507900c045200524",
        "138805b4024a44ef0358028c091601484500be009e000401189000"
    ))
    .unwrap();

    let expected: &[u8] = b"F# F# G A A G F# E D D E F# F# E E F# F# G A A \
        G F# E D D E F# E D D E E F# D E F# G F# D E F# \
        G F# E D E A F# F# G A A G F# E D D E F# E D D\x00";
    assert_eq!(lznt1::decompress(&src).unwrap(), expected);
}

// ---------------------------------------------------------------------------
// LZO1X
// ---------------------------------------------------------------------------

#[test]
fn lzo_literal_stream() {
    // Initial literal run of 13 bytes followed by the end-of-stream marker.
    let mut src = vec![30u8];
    src.extend_from_slice(b"LZO literal r");
    src.extend_from_slice(&[17, 0, 0]);
    assert_eq!(lzo::decompress(&src, false, None).unwrap(), b"LZO literal r");
}

#[test]
fn lzo_header_carries_output_length() {
    let src = [0xF0, 5, 0, 0, 0, 19, b'a', b'b', 68, 0];
    assert_eq!(lzo::decompress(&src, true, None).unwrap(), b"ababa");
}

// ---------------------------------------------------------------------------
// LZXPRESS (plain)
// ---------------------------------------------------------------------------

#[test]
fn lzxpress_known_vector() {
    let src = hex::decode("ffffff1f61626317000fff2601").unwrap();
    assert_eq!(lzxpress::decompress(&src).unwrap(), b"abc".repeat(100));
}

// ---------------------------------------------------------------------------
// LZXPRESS Huffman
// ---------------------------------------------------------------------------

#[test]
fn lzxpress_huffman_known_vector() {
    let src = hex::decode(concat!(
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0000000000000000000000000000000030230000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0200000000000000000000000000002000000000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "a8dc0000ff2601"
    ))
    .unwrap();
    assert_eq!(lzxpress_huffman::decompress(&src).unwrap(), b"abc".repeat(100));
}

// ---------------------------------------------------------------------------
// LZFSE / LZVN
// ---------------------------------------------------------------------------

#[test]
fn lzfse_lzvn_block() {
    let src =
        hex::decode("6276786e2c01000013000000c803616263f0fff005e163060000000000000062767824")
            .unwrap();
    let out = lzfse::decompress(&src).unwrap();
    assert_eq!(out, b"abc".repeat(100));
    assert_eq!(
        sha256_hex(&out),
        "d9f5aeb06abebb3be3f38adec9a2e3b94228d52193be923eb4e24c9b56ee0930"
    );
}

#[test]
fn lzfse_compressed_block() {
    let src = hex::decode(concat!(
        "62767832df360000a401200e000d0030b92c8bef56220070a50000003984",
        "70085f00b0000000383e59c0f1090000005fc027710c0000fc031c1f03c7",
        "700cc70000000000000000006c00003600000000005f07000000e7000000",
        "00100060418004120000e06338f9061e8067629dacdf013e836fe041f807",
        "be80fd14fc0e3fc29f704700000000000000000000000000000000000000",
        "000000000000000000000000000000000000101288d24318d9f446277ac6",
        "885a4b5dea360854e4c4616262d667f9f1ff53187e598fe2f5ddf7b768f4",
        "bcc1f6441b9e55e0d1be84b4b91544337f11c4d0d615068c79817f5d19f2",
        "09c83975cf9669b7f3d1024d9cc795e8ac449090696a7660585fac1a891c",
        "40557bb46c1b62a35ab2608d574e82ba9f3956d0f811370c78d69b24240f",
        "fd80ec4eccb6dc1e7f1c6f2f276a71e9c73183844c3dce83088eeed6c77c",
        "3e35316f414db430fcd2e22d0c07998d601addd5907f852df080386fe69e",
        "b78675198704b4bf5361caaf482e9333c6de0d46fbf87b4387fc6ac57116",
        "0300000000000000000066b7fffffff3fffa3ff7ff1fd2273e1f85c5f04f",
        "0f4945ab8462767824"
    ))
    .unwrap();
    assert_eq!(
        sha256_hex(&lzfse::decompress(&src).unwrap()),
        "73d3dd96ca2e2f0144a117019256d770ee7c6febeaee09b24956c723ae22b529"
    );
}

#[test]
fn lzvn_bare_stream() {
    // The payload of the bvxn vector above, without the lzfse framing.
    let src = hex::decode("c803616263f0fff005e1630600000000000000").unwrap();
    assert_eq!(lzvn::decompress(&src).unwrap(), b"abc".repeat(100));
}

// ---------------------------------------------------------------------------
// LZBITMAP
// ---------------------------------------------------------------------------

#[test]
fn lzbitmap_stored_chunks() {
    let src = hex::decode(concat!(
        "5a424d093100002b0000536d616c6c2066696c657320646f6e2774206765",
        "7420636f6d7072657373656420617420616c6c2e2e2e0a060000000000"
    ))
    .unwrap();
    let out = lzbitmap::decompress(&src).unwrap();
    assert_eq!(out, b"Small files don't get compressed at all...\n");
    assert_eq!(
        sha256_hex(&out),
        "8c929efb5fd28b5b82385b67b408f5e775a4756d7cc6373eebddb8668343ad40"
    );
}

#[test]
fn lzbitmap_small_compressed() {
    let src = hex::decode(concat!(
        "5a424d092d0000a0000018000018000018000061616161616161617835ef",
        "340f0000f10f00000000000000000000000000060000000000"
    ))
    .unwrap();
    let out = lzbitmap::decompress(&src).unwrap();
    assert_eq!(out, [b"a".repeat(158), b"xa".to_vec()].concat());
    assert_eq!(
        sha256_hex(&out),
        "ef56118ff333a8bfeffc346c4987a1a178762570b3eb1d704a2c1e9b3a877561"
    );
}

#[test]
fn lzbitmap_large_compressed() {
    let src = hex::decode(concat!(
        "5a424d09d80100df36002301005001007601004c6f72656d20697073756d",
        "20646f6c6f722073742061657420636e7365636574757220616469706973",
        "696e67656c69742e517573716566617563627520657820736170656e7661",
        "6570656c6c6e6573656d6c61637261496e20696475727573206d69707269",
        "74656c757364206f76616c7354656d7075206c656f7561656e6561646469",
        "6d206e2074656d706f72506c6e7276697675736672696c61206c636e636d",
        "657473626962656e64756d67657461732e496c696d6173206e6c6d616c75",
        "64616c696e616e746567726e6e63707365722e5574206864726572697473",
        "6d7072766c637373207074656e74747469736f6f73712e41646c696f7261",
        "6f7175657465727562696f74726370746f686d6f732e0a0a4c0d2c341b41",
        "3e26113c5f6e805b6b7c65529d967ec4b310edb922ca7b1deca5faf4434a",
        "fbfa52fb8272b2ffb7016f7fcbc1b9f1373af99e3eb4e94fa9b3bafe39d3",
        "6959add6f36b55eecdb59d2ec3d1d029fc0055a9cbed016111718114103f",
        "480147110116011040f125f3ffffffffffffffffffffffffffffffffffff",
        "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        "ffffffffffffffff1f002cf68f57d9c576d73bfd7cd3d756000006000000",
        "0000"
    ))
    .unwrap();
    assert_eq!(
        sha256_hex(&lzbitmap::decompress(&src).unwrap()),
        "73d3dd96ca2e2f0144a117019256d770ee7c6febeaee09b24956c723ae22b529"
    );
}

// ---------------------------------------------------------------------------
// 7-bit packing
// ---------------------------------------------------------------------------

#[test]
fn sevenbit_round_trip_known_vector() {
    let packed = hex::decode("b796384d078ddf6db8bc3c9fa7df6e10bd3ca783e67479da7d06").unwrap();

    assert_eq!(sevenbit::compress(b"7-bit compression test string"), packed);
    assert_eq!(
        sevenbit::decompress(&packed, false),
        b"7-bit compression test string"
    );
}

#[test]
fn sevenbit_decompress_wide() {
    let packed = hex::decode("b796384d078ddf6db8bc3c9fa7df6e10bd3ca783e67479da7d06").unwrap();
    let expected: Vec<u8> = b"7-bit compression test string"
        .iter()
        .flat_map(|&b| [b, 0])
        .collect();
    assert_eq!(sevenbit::decompress(&packed, true), expected);
}

// ---------------------------------------------------------------------------
// Reader entry points
// ---------------------------------------------------------------------------

#[test]
fn reader_entry_points_match_slice_entry_points() {
    let src = b"\xff\x0cLZ4 compression test string\x1b\x00\xdbPtring";
    let mut cursor = std::io::Cursor::new(src.to_vec());
    assert_eq!(
        lz4::decompress_from(&mut cursor, None).unwrap(),
        lz4::decompress(src, None).unwrap()
    );

    let src = hex::decode("ffffff1f61626317000fff2601").unwrap();
    let mut cursor = std::io::Cursor::new(src.clone());
    assert_eq!(
        lzxpress::decompress_from(&mut cursor).unwrap(),
        lzxpress::decompress(&src).unwrap()
    );
}
