//! Property tests for query rendering and filter boolean algebra.

use proptest::prelude::*;

use benchproc::filter::Filter;
use benchproc::kvql::{self, Pattern, Query};
use benchproc::record::Record;

fn leaf(key: &str, value: &str) -> Query {
    Query::Match {
        offset: 0,
        key: key.to_string(),
        pattern: Pattern::new(value).unwrap(),
    }
}

/// Matches over a small key and value vocabulary so that random records
/// hit them often.
fn arb_leaf() -> impl Strategy<Value = Query> {
    let keys = prop_oneof![
        Just("a"),
        Just("b"),
        Just(".unit"),
        Just(".name"),
        Just("/size"),
    ];
    let values = prop_oneof![
        Just("1"),
        Just("2"),
        Just("[12]"),
        Just("ns/op"),
        Just("B/op"),
        Just("Benchmark.*"),
        Just(".*"),
        Just(""),
    ];
    (keys, values).prop_map(|(k, v)| leaf(k, v))
}

fn arb_query() -> impl Strategy<Value = Query> {
    arb_leaf().prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(Query::not),
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Query::and),
            proptest::collection::vec(inner, 0..4).prop_map(Query::or),
        ]
    })
}

fn arb_record() -> impl Strategy<Value = Record> {
    let config = proptest::collection::vec(
        (prop_oneof![Just("a"), Just("b")], prop_oneof![Just("1"), Just("2"), Just("3")]),
        0..3,
    );
    let name = prop_oneof![
        Just("BenchmarkA"),
        Just("BenchmarkA/size=1"),
        Just("BenchmarkB/size=2-8"),
        Just("Other"),
    ];
    let units = proptest::collection::vec(
        prop_oneof![Just("ns/op"), Just("B/op"), Just("allocs/op")],
        1..70,
    );
    (config, name, units).prop_map(|(config, name, units)| {
        let mut r = Record::new(name);
        for (k, v) in config {
            r.set_file_config(k, v);
        }
        for (i, unit) in units.into_iter().enumerate() {
            r.push_value(f64::from(u32::try_from(i).unwrap()), unit);
        }
        r
    })
}

fn bits(q: Query, r: &Record) -> Vec<bool> {
    let m = Filter::from_query(q).unwrap().match_record(r);
    (0..r.values.len()).map(|i| m.test(i)).collect()
}

proptest::proptest! {
    #[test]
    fn render_parse_is_stable(q in arb_query()) {
        let text = q.to_string();
        let parsed = kvql::parse(&text).unwrap();
        let rendered = parsed.to_string();
        let reparsed = kvql::parse(&rendered).unwrap();
        prop_assert_eq!(reparsed.to_string(), rendered);
    }

    #[test]
    fn rendered_query_matches_the_same(q in arb_query(), r in arb_record()) {
        let parsed = kvql::parse(&q.to_string()).unwrap();
        prop_assert_eq!(bits(parsed, &r), bits(q, &r));
    }

    #[test]
    fn not_inverts(q in arb_query(), r in arb_record()) {
        let want: Vec<bool> = bits(q.clone(), &r).into_iter().map(|b| !b).collect();
        prop_assert_eq!(bits(Query::not(q), &r), want);
    }

    #[test]
    fn and_or_are_pointwise(q1 in arb_query(), q2 in arb_query(), r in arb_record()) {
        let b1 = bits(q1.clone(), &r);
        let b2 = bits(q2.clone(), &r);
        let and: Vec<bool> = b1.iter().zip(&b2).map(|(x, y)| *x && *y).collect();
        let or: Vec<bool> = b1.iter().zip(&b2).map(|(x, y)| *x || *y).collect();
        prop_assert_eq!(bits(Query::and(vec![q1.clone(), q2.clone()]), &r), and);
        prop_assert_eq!(bits(Query::or(vec![q1, q2]), &r), or);
    }

    #[test]
    fn match_summary_agrees_with_bits(q in arb_query(), r in arb_record()) {
        let m = Filter::from_query(q).unwrap().match_record(&r);
        let b: Vec<bool> = (0..r.values.len()).map(|i| m.test(i)).collect();
        prop_assert_eq!(m.all(), b.iter().all(|x| *x));
        prop_assert_eq!(m.any(), b.iter().any(|x| *x));
        prop_assert!(!m.test(r.values.len()));
    }
}
