//! Fuzz driver for serde_json: parse arbitrary bytes, round-trip whatever
//! parses.

fn main() {
    bytefuzz::fuzz_main(|data| {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
            let rendered = serde_json::to_vec(&value).expect("values render");
            let reparsed: serde_json::Value =
                serde_json::from_slice(&rendered).expect("rendered values reparse");
            assert_eq!(value, reparsed);
        }
    });
}
