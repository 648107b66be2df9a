#![forbid(unsafe_code)]

use proptest::prelude::*;
use routelens::core::community::CommunityProcessor;

proptest! {
    /// An `x`-run of length n matches exactly n digits, and the captured
    /// group lands in the description with leading zeros stripped.
    #[test]
    fn x_run_group_extraction(digits in proptest::collection::vec(0u8..=9u8, 1..=6)) {
        let run = "x".repeat(digits.len());
        let value: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        let processor = CommunityProcessor::new(&format!("65535:{run},got $0"), "").unwrap();

        let out = processor.format_bgp_text(&format!("BGP.community: (65535, {value})"));
        let normalized = value.parse::<u64>().unwrap().to_string();
        prop_assert!(out.contains(&format!("[got {normalized}]")), "{}", out);
        prop_assert!(out.contains(&format!("title=\"(65535, {value})\"")), "{}", out);

        // One digit more or less never matches an exact-width run.
        let longer = format!("{value}0");
        let out = processor.format_bgp_text(&format!("BGP.community: (65535, {longer})"));
        prop_assert!(!out.contains("[got "), "{}", out);
    }

    /// `nnn` matches any width and normalises the capture numerically.
    #[test]
    fn nnn_group_extraction(value in 0u64..=4_294_967_295u64) {
        let processor = CommunityProcessor::new("65535:nnn,any $0", "").unwrap();
        let out = processor.format_bgp_text(&format!("BGP.community: (65535, {value})"));
        prop_assert!(out.contains(&format!("[any {value}]")), "{}", out);
    }

    /// Annotated output is a fixed point of the scanner.
    #[test]
    fn annotation_is_idempotent(a in 0u32..=99999u32, b in 0u32..=99999u32) {
        let processor = CommunityProcessor::new("65535:nnn,any $0\nnnn:nnn,pair $0 $1", "").unwrap();
        let input = format!("BGP.community: ({a}, {b}) (65535, 666)");
        let once = processor.format_bgp_text(&input);
        let twice = processor.format_bgp_text(&once);
        prop_assert_eq!(once, twice);
    }
}
