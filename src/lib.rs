//! Apache-2 licensed Aquahash implementation.
//!
//! Aquahash is a memory-hard proof of work from the Ethash family (protocol
//! revision 23). A small cache is derived from the epoch seed, every node of
//! the multi-gigabyte dataset is derived from that cache, and the final proof
//! mixes 64 data-dependent dataset reads. Light evaluation recomputes the few
//! dataset nodes it touches, full evaluation reads them from memory.

mod dag;
mod errors;
mod miller_rabin;

pub mod config;
pub mod dataset;
pub mod difficulty;
pub mod io;

pub use dag::{FullDAG, FullDAGError, LightDAG};
pub use errors::{AquahashError, Result};

use byteorder::{ByteOrder, LittleEndian};
use ethereum_types::{H256, H512};
use miller_rabin::is_prime;
use sha3::{Digest, Keccak256, Keccak512};

/// Protocol revision, part of the dataset file name.
pub const REVISION: u32 = 23;

const DATASET_BYTES_INIT: u64 = 1073741824; // 2 to the power of 30.
const DATASET_BYTES_GROWTH: u64 = 8388608; // 2 to the power of 23.
const CACHE_BYTES_INIT: u64 = 16777216; // 2 to the power of 24.
const CACHE_BYTES_GROWTH: u64 = 131072; // 2 to the power of 17.
pub const MIX_BYTES: usize = 128;
pub const HASH_BYTES: usize = 64;
const WORD_BYTES: usize = 4;
const NODE_WORDS: usize = HASH_BYTES / WORD_BYTES;
const MIX_WORDS: usize = MIX_BYTES / WORD_BYTES;
const MIX_NODES: usize = MIX_WORDS / NODE_WORDS;
const DATASET_PARENTS: u32 = 256;
const CACHE_ROUNDS: usize = 3;
const ACCESSES: u32 = 64;
const FNV_PRIME: u32 = 0x01000193;

pub const EPOCH_LENGTH: u64 = 30000;

/// Outcome of one evaluation of the hash for a `(header_hash, nonce)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProofResult {
    pub result: H256,
    pub mix_hash: H256,
    pub success: bool,
}

pub fn epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// Cache size in bytes for the epoch of `block_number`. The node count is
/// always prime.
pub fn get_cache_size(block_number: u64) -> usize {
    let mut sz = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch(block_number);
    sz -= HASH_BYTES as u64;
    while !is_prime(sz / HASH_BYTES as u64) {
        sz -= 2 * HASH_BYTES as u64;
    }
    sz as usize
}

/// Dataset size in bytes for the epoch of `block_number`. The number of
/// `MIX_BYTES` rows is always prime.
pub fn get_full_size(block_number: u64) -> usize {
    let mut sz = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch(block_number);
    sz -= MIX_BYTES as u64;
    while !is_prime(sz / MIX_BYTES as u64) {
        sz -= 2 * MIX_BYTES as u64;
    }
    sz as usize
}

pub fn keccak_512(data: &[u8]) -> [u8; 64] {
    let mut output = [0u8; 64];
    output.copy_from_slice(&Keccak512::digest(data));
    output
}

pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Keccak256::digest(data));
    output
}

/// Get the seedhash for a given block number.
pub fn get_seedhash(block_number: u64) -> H256 {
    let mut seed = [0u8; 32];
    for _ in 0..epoch(block_number) {
        seed = keccak_256(&seed);
    }
    H256(seed)
}

#[inline]
fn fnv(v1: u32, v2: u32) -> u32 {
    v1.wrapping_mul(FNV_PRIME) ^ v2
}

fn fnv_mix<const N: usize>(mix: &mut [u32; N], data: &[u32; N]) {
    for (m, d) in mix.iter_mut().zip(data.iter()) {
        *m = fnv(*m, *d);
    }
}

fn read_words<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    LittleEndian::read_u32_into(&bytes[..N * WORD_BYTES], &mut words);
    words
}

pub(crate) fn check_size(size: usize, unit: usize) -> Result<()> {
    if size == 0 || size % unit != 0 {
        return Err(AquahashError::InvalidSize { size, unit });
    }
    Ok(())
}

/// Reserve a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn allocate(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|source| AquahashError::AllocationFailure { size, source })?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Make an Aquahash cache using the given seed.
///
/// The first pass is a Keccak-512 hash chain. Each of the `CACHE_ROUNDS`
/// following passes replaces node `i` with the hash of node `i` xor the node
/// selected by the first word of node `i`.
pub fn make_cache(cache: &mut [u8], seed: H256) -> Result<()> {
    check_size(cache.len(), HASH_BYTES)?;
    let n = cache.len() / HASH_BYTES;

    cache[..HASH_BYTES].copy_from_slice(&keccak_512(seed.as_bytes()));
    for i in 1..n {
        let (last, next) = cache.split_at_mut(i * HASH_BYTES);
        next[..HASH_BYTES].copy_from_slice(&keccak_512(&last[(last.len() - HASH_BYTES)..]));
    }

    for _ in 0..CACHE_ROUNDS {
        for i in 0..n {
            let node = i * HASH_BYTES;
            let dst = (LittleEndian::read_u32(&cache[node..]) as usize % n) * HASH_BYTES;
            let mut r = [0u8; HASH_BYTES];
            for (j, b) in r.iter_mut().enumerate() {
                *b = cache[node + j] ^ cache[dst + j];
            }
            cache[node..node + HASH_BYTES].copy_from_slice(&keccak_512(&r));
        }
    }
    Ok(())
}

/// Allocate and fill a cache of `cache_size` bytes.
pub fn build_cache(cache_size: usize, seed: H256) -> Result<Vec<u8>> {
    check_size(cache_size, HASH_BYTES)?;
    let mut cache = allocate(cache_size)?;
    make_cache(&mut cache, seed)?;
    Ok(cache)
}

/// Derive dataset node `i` from the cache. Depends on nothing but `cache`
/// and `i`, so nodes can be computed in any order or in parallel.
///
/// Panics if `cache` is shorter than one node.
pub fn calc_dataset_item(cache: &[u8], i: usize) -> H512 {
    let n = cache.len() / HASH_BYTES;
    let index = i as u32;
    let row = (i % n) * HASH_BYTES;

    let mut buf = [0u8; HASH_BYTES];
    let mut mix: [u32; NODE_WORDS] = read_words(&cache[row..row + HASH_BYTES]);
    mix[0] ^= index;
    LittleEndian::write_u32_into(&mix, &mut buf);
    mix = read_words(&keccak_512(&buf));

    for j in 0..DATASET_PARENTS {
        let parent = fnv(index ^ j, mix[j as usize % NODE_WORDS]) as usize % n;
        let offset = parent * HASH_BYTES;
        let data: [u32; NODE_WORDS] = read_words(&cache[offset..offset + HASH_BYTES]);
        fnv_mix(&mut mix, &data);
    }

    LittleEndian::write_u32_into(&mix, &mut buf);
    H512(keccak_512(&buf))
}

/// Keccak-512 of the header hash followed by the little-endian nonce.
pub(crate) fn hashimoto_seed(header_hash: H256, nonce: u64) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(header_hash.as_bytes());
    hasher.update(nonce.to_le_bytes());
    let mut seed = [0u8; 64];
    seed.copy_from_slice(&hasher.finalize());
    seed
}

/// "Main" function of Aquahash, calculating the mix digest and result given
/// the header hash and nonce. `lookup` returns dataset node `i`, or `None`
/// when it cannot, in which case the result is unsuccessful.
pub fn hashimoto<F>(header_hash: H256, nonce: u64, full_size: usize, lookup: F) -> ProofResult
where
    F: Fn(usize) -> Option<H512>,
{
    let rows = (full_size / MIX_BYTES) as u32;
    if rows == 0 {
        return ProofResult::default();
    }

    let seed = hashimoto_seed(header_hash, nonce);
    let seed_head = LittleEndian::read_u32(&seed);
    let seed_words: [u32; NODE_WORDS] = read_words(&seed);

    let mut mix = [0u32; MIX_WORDS];
    for (i, w) in mix.iter_mut().enumerate() {
        *w = seed_words[i % NODE_WORDS];
    }

    let mut temp = [0u32; MIX_WORDS];
    for i in 0..ACCESSES {
        let parent = fnv(i ^ seed_head, mix[i as usize % MIX_WORDS]) % rows;
        for k in 0..MIX_NODES {
            let index = MIX_NODES * parent as usize + k;
            let node = match lookup(index) {
                Some(node) => node,
                None => {
                    log::debug!("dataset lookup of node {index} failed");
                    return ProofResult::default();
                }
            };
            let from = k * NODE_WORDS;
            LittleEndian::read_u32_into(node.as_bytes(), &mut temp[from..from + NODE_WORDS]);
        }
        fnv_mix(&mut mix, &temp);
    }

    let mix_hash = compress_mix(&mix);
    let mut hasher = Keccak256::new();
    hasher.update(seed);
    hasher.update(mix_hash);

    ProofResult {
        result: H256::from_slice(&hasher.finalize()),
        mix_hash: H256(mix_hash),
        success: true,
    }
}

/// Fold each group of 4 adjacent mix words into one by xor.
fn compress_mix(mix: &[u32; MIX_WORDS]) -> [u8; 32] {
    let mut cmix = [0u32; MIX_WORDS / 4];
    for (c, w) in cmix.iter_mut().zip(mix.chunks_exact(4)) {
        *c = w[0] ^ w[1] ^ w[2] ^ w[3];
    }
    let mut mix_hash = [0u8; 32];
    LittleEndian::write_u32_into(&cmix, &mut mix_hash);
    mix_hash
}

/// Aquahash used by a light client. Only needs the cache. A cache without a
/// single whole node gives an unsuccessful result.
pub fn hashimoto_light(
    header_hash: H256,
    nonce: u64,
    full_size: usize,
    cache: &[u8],
) -> ProofResult {
    if cache.len() < HASH_BYTES {
        return ProofResult::default();
    }
    let nodes = full_size / HASH_BYTES;
    hashimoto(header_hash, nonce, full_size, |i| {
        (i < nodes).then(|| calc_dataset_item(cache, i))
    })
}

/// Aquahash used by a full client. Reads nodes from the whole dataset.
pub fn hashimoto_full(header_hash: H256, nonce: u64, dataset: &[u8]) -> ProofResult {
    hashimoto(header_hash, nonce, dataset.len(), |i| {
        dataset
            .get(i * HASH_BYTES..(i + 1) * HASH_BYTES)
            .map(H512::from_slice)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const TEST_CACHE_SIZE: usize = 1024;
    const TEST_FULL_SIZE: usize = 128 * 64;

    #[test]
    fn sizes_for_first_epochs() {
        assert_eq!(get_cache_size(0), 16776896);
        assert_eq!(get_full_size(0), 1073739904);
        assert_eq!(get_cache_size(29999), 16776896);
        assert_eq!(get_cache_size(30000), 16907456);
        assert_eq!(get_full_size(30000), 1082130304);
        assert_eq!(get_cache_size(100 * EPOCH_LENGTH), 29882816);
        assert_eq!(get_full_size(100 * EPOCH_LENGTH), 1912601216);
    }

    #[test]
    fn sizes_are_aligned() {
        for epoch in [0u64, 1, 17, 300] {
            let block = epoch * EPOCH_LENGTH;
            assert_eq!(get_cache_size(block) % HASH_BYTES, 0);
            assert_eq!(get_full_size(block) % MIX_BYTES, 0);
            assert!(get_full_size(block) > get_cache_size(block));
        }
    }

    #[test]
    fn seedhash_depends_on_epoch_only() {
        assert_eq!(get_seedhash(0), H256::zero());
        assert_eq!(get_seedhash(29999), H256::zero());
        assert_eq!(
            get_seedhash(30000),
            H256(hex!("290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"))
        );
        assert_eq!(get_seedhash(30000), get_seedhash(59999));
        assert_eq!(
            get_seedhash(60000),
            H256(hex!("510e4e770828ddbf7f7b00ab00a9f6adaf81c0dc9cc85f1f8249c256942d61d9"))
        );
    }

    #[test]
    fn keccak_is_not_nist_sha3() {
        assert_eq!(
            keccak_256(&[]),
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn fnv_wraps() {
        assert_eq!(fnv(0, 7), 7);
        assert_eq!(fnv(1, 0), FNV_PRIME);
        assert_eq!(fnv(u32::MAX, 0), 0u32.wrapping_sub(FNV_PRIME));
    }

    #[test]
    fn cache_matches_reference() {
        let expected = ::hex::decode(include_str!("../tests/fixtures/cache_1024.hex").trim()).unwrap();
        let cache = build_cache(TEST_CACHE_SIZE, H256::zero()).unwrap();
        assert_eq!(cache, expected);
        assert_eq!(
            cache[..64],
            hex!("8049574e9f80cf4d72ab0c8510f9505a06571ef77c5975a69b32b1b49dc705ed3326cdcc25c2cf58ddd6c662241a1b9a432322f4fdd249cf5cd6fa07b56ffc8e")
        );
    }

    #[test]
    fn cache_is_deterministic() {
        let seed = get_seedhash(30000);
        assert_eq!(build_cache(4096, seed).unwrap(), build_cache(4096, seed).unwrap());
        assert_ne!(build_cache(4096, seed).unwrap(), build_cache(4096, H256::zero()).unwrap());
    }

    #[test]
    fn cache_rejects_bad_sizes() {
        assert!(matches!(
            build_cache(0, H256::zero()),
            Err(AquahashError::InvalidSize { size: 0, unit: 64 })
        ));
        assert!(matches!(
            build_cache(1000, H256::zero()),
            Err(AquahashError::InvalidSize { size: 1000, .. })
        ));
        assert!(matches!(
            build_cache(usize::MAX - 63, H256::zero()),
            Err(AquahashError::AllocationFailure { .. })
        ));
        let mut odd = [0u8; 65];
        assert!(make_cache(&mut odd, H256::zero()).is_err());
    }

    #[test]
    fn dataset_items_match_reference() {
        let cache = build_cache(TEST_CACHE_SIZE, H256::zero()).unwrap();
        assert_eq!(
            calc_dataset_item(&cache, 0).0,
            hex!("7697b9f724c4fdc497464259039dc49e93dc9faf96504320ee2e8c508765ff007abc2d1d598180183d95a8005dd085f814a95b0430ad47c24e688b5aedb72627")
        );
        assert_eq!(
            calc_dataset_item(&cache, 5).0,
            hex!("c675e3141b22cf2d3cb8d7a8b2cb9f1a1072853d3727382ec549ea2bb5b01576c9a7b72489a09d748c20d133b6b1a9aac0f2a944cc00270721b8e58a96a0c434")
        );
        // indices past the cache wrap onto a row but are salted by the index
        assert_ne!(calc_dataset_item(&cache, 16), calc_dataset_item(&cache, 0));
    }

    #[test]
    fn dataset_items_are_order_independent() {
        let cache = build_cache(TEST_CACHE_SIZE, H256::zero()).unwrap();
        let forward: Vec<H512> = (0..32).map(|i| calc_dataset_item(&cache, i)).collect();
        let mut backward: Vec<H512> = (0..32).rev().map(|i| calc_dataset_item(&cache, i)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn nonce_is_packed_little_endian() {
        let header_hash = H256(hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"));
        let seed = hashimoto_seed(header_hash, 0x0102030405060708);
        assert_eq!(
            seed,
            hex!("9ed01a89bd6cac79582d07b0fd889d2b48f90498712895ab8447965e7f13185595b69461dbf39686be2d34416fdfc051630650fcea9b05d710a8f708a4c83240")
        );

        let mut input = [0u8; 40];
        input[..32].copy_from_slice(header_hash.as_bytes());
        input[32..].copy_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(seed, keccak_512(&input));
    }

    #[test]
    fn light_and_full_agree() {
        let cache = build_cache(TEST_CACHE_SIZE, H256::zero()).unwrap();
        let dataset: Vec<u8> = (0..TEST_FULL_SIZE / HASH_BYTES)
            .flat_map(|i| calc_dataset_item(&cache, i).0)
            .collect();
        let header_hash = H256(hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"));

        for nonce in [0u64, 1, 0x0102030405060708, u64::MAX] {
            let light = hashimoto_light(header_hash, nonce, TEST_FULL_SIZE, &cache);
            let full = hashimoto_full(header_hash, nonce, &dataset);
            assert!(light.success);
            assert_eq!(light, full);
        }

        let proof = hashimoto_full(header_hash, 0x0102030405060708, &dataset);
        assert_eq!(
            proof.result,
            H256(hex!("9450c0b492922482a75af1054e41241dfa2b1cc1cf38c0484f99679d749766c8"))
        );
        assert_eq!(
            proof.mix_hash,
            H256(hex!("d470a9d4f8b4aeb72f333c14de0d10e231dd6c6f83ee110de43128a6933f357f"))
        );
    }

    #[test]
    fn mix_is_compressed_by_xor() {
        let mut mix = [0u32; MIX_WORDS];
        for (j, w) in mix.iter_mut().enumerate() {
            *w = 1 << j;
        }
        let mut expected = [0u8; 32];
        for (i, chunk) in expected.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&(0xfu32 << (4 * i)).to_le_bytes());
        }
        assert_eq!(compress_mix(&mix), expected);

        // consecutive values from a multiple of 4 cancel out
        let mut mix = [0u32; MIX_WORDS];
        for (j, w) in mix.iter_mut().enumerate() {
            *w = j as u32 + 0x100;
        }
        assert_eq!(compress_mix(&mix), [0u8; 32]);
    }

    #[test]
    fn light_proof_matches_reference() {
        let cache = build_cache(TEST_CACHE_SIZE, H256::zero()).unwrap();
        let proof = hashimoto_light(H256::repeat_byte(3), 42, TEST_FULL_SIZE, &cache);
        assert!(proof.success);
        assert_eq!(
            proof.mix_hash,
            H256(hex!("9d6c692763320032d468e8be54918198754c65286e7ec30ae208a64e53eef063"))
        );
        assert_eq!(
            proof.result,
            H256(hex!("6a0d30cd7e38479e6229de6d7c2e7e822ffc5efd493cf29add20196fa82fc4df"))
        );
    }

    #[test]
    fn short_cache_is_unsuccessful() {
        for len in [0, 1, HASH_BYTES - 1] {
            let proof = hashimoto_light(H256::zero(), 0, TEST_FULL_SIZE, &vec![0u8; len]);
            assert_eq!(proof, ProofResult::default(), "cache length: {len}");
        }
    }

    #[test]
    fn failed_lookup_is_unsuccessful() {
        let proof = hashimoto(H256::zero(), 0, TEST_FULL_SIZE, |_| None);
        assert!(!proof.success);
        assert_eq!(proof.result, H256::zero());

        // a dataset shorter than the declared size
        let short = hashimoto_light(H256::zero(), 0, 0, &[0u8; 64]);
        assert!(!short.success);
    }
}
