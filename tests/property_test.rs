use brightchain::{xor_buffers, GfShamir};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // XOR is self-inverse: folding the derived buffer back against all but
    // one operand recovers the remaining operand.
    #[test]
    fn xor_self_inverse(
        a in proptest::collection::vec(any::<u8>(), 1..512),
        b in proptest::collection::vec(any::<u8>(), 1..512),
        c in proptest::collection::vec(any::<u8>(), 1..512),
    ) {
        let len = a.len().min(b.len()).min(c.len());
        let (a, b, c) = (&a[..len], &b[..len], &c[..len]);
        let r = xor_buffers(&[a, b, c]).unwrap();
        let back = xor_buffers(&[&r, b, c]).unwrap();
        prop_assert_eq!(back.as_slice(), a);
    }

    // Operand order never changes the XOR result.
    #[test]
    fn xor_commutative(
        a in proptest::collection::vec(any::<u8>(), 32..256),
        b in proptest::collection::vec(any::<u8>(), 32..256),
    ) {
        let len = a.len().min(b.len());
        let (a, b) = (&a[..len], &b[..len]);
        prop_assert_eq!(xor_buffers(&[a, b]).unwrap(), xor_buffers(&[b, a]).unwrap());
    }

    // Any threshold-sized subset of shares recovers the secret, for every
    // supported field width that fits the share count.
    #[test]
    fn shamir_any_threshold_subset_recovers(
        secret in proptest::collection::vec(any::<u8>(), 1..64),
        bits in 3u32..=10,
        skip in 0usize..5,
    ) {
        let gf = GfShamir::new(bits).unwrap();
        let n = 5u32.min(gf.max_shares());
        let t = 3u32.min(n);
        let shares = gf.split(&secret, n, t, &mut rand::thread_rng()).unwrap();

        let mut subset = shares.clone();
        let len = subset.len();
        subset.rotate_left(skip % len);
        subset.truncate(t as usize);
        prop_assert_eq!(gf.combine(&subset).unwrap(), secret);
    }
}
