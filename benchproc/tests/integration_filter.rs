//! Integration tests for parsing queries and filtering records.

use benchproc::filter::Filter;
use benchproc::kvql::{self, Query};
use benchproc::record::Record;

fn result(goos: &str, name: &str, units: &[&str]) -> Record {
    let mut r = Record::new(name)
        .with_file_config("goos", goos)
        .with_file_config("commit", "abc123");
    for (i, unit) in units.iter().enumerate() {
        r.push_value(f64::from(u32::try_from(i).unwrap()), unit);
    }
    r
}

fn survivors(query: &str, records: &[Record]) -> Vec<String> {
    let filter = Filter::new(query).unwrap();
    records
        .iter()
        .cloned()
        .filter_map(|mut r| {
            filter.match_record(&r).apply(&mut r).then(|| {
                let units: Vec<&str> = r.values.iter().map(|v| v.unit.as_str()).collect();
                format!("{} {} [{}]", r.file_config_value("goos"), r.full_name(), units.join(","))
            })
        })
        .collect()
}

fn stream() -> Vec<Record> {
    vec![
        result("linux", "BenchmarkEncode/size=1-8", &["ns/op", "B/op"]),
        result("linux", "BenchmarkEncode/size=1024-8", &["ns/op", "B/op"]),
        result("darwin", "BenchmarkEncode/size=1-8", &["ns/op", "B/op"]),
        result("linux", "BenchmarkDecode/size=1-4", &["ns/op", "allocs/op"]),
    ]
}

#[test]
fn test_filter_stream() {
    let recs = stream();

    assert_eq!(survivors("*", &recs).len(), 4);
    assert!(survivors("-*", &recs).is_empty());

    assert_eq!(
        survivors("goos:linux /size:1", &recs),
        [
            "linux BenchmarkEncode/size=1-8 [ns/op,B/op]",
            "linux BenchmarkDecode/size=1-4 [ns/op,allocs/op]",
        ]
    );

    assert_eq!(
        survivors(".name:BenchmarkEncode AND -goos:linux", &recs),
        ["darwin BenchmarkEncode/size=1-8 [ns/op,B/op]"]
    );

    assert_eq!(
        survivors("/gomaxprocs:4 OR /size:1024", &recs),
        [
            "linux BenchmarkEncode/size=1024-8 [ns/op,B/op]",
            "linux BenchmarkDecode/size=1-4 [ns/op,allocs/op]",
        ]
    );
}

#[test]
fn test_filter_prunes_units() {
    let recs = stream();

    assert_eq!(
        survivors("goos:darwin .unit:ns/op", &recs),
        ["darwin BenchmarkEncode/size=1-8 [ns/op]"]
    );

    // Records left with no measurements are dropped.
    assert_eq!(
        survivors(".unit:allocs/op", &recs),
        ["linux BenchmarkDecode/size=1-4 [allocs/op]"]
    );

    // Negation applies per measurement.
    assert_eq!(
        survivors(".name:BenchmarkDecode -.unit:ns/op", &recs),
        ["linux BenchmarkDecode/size=1-4 [allocs/op]"]
    );
}

#[test]
fn test_regex_values_are_anchored() {
    let recs = stream();
    assert!(survivors("goos:lin", &recs).is_empty());
    assert_eq!(survivors("goos:lin.*", &recs).len(), 3);
    assert_eq!(survivors(".fullname:.*size=1-.*", &recs).len(), 3);
    assert_eq!(survivors(r#"commit:"abc[0-9]+""#, &recs).len(), 4);
}

#[test]
fn test_multi_value_match() {
    let recs = stream();
    assert_eq!(survivors("goos:(darwin windows)", &recs).len(), 1);
    assert_eq!(survivors(".unit:(B/op allocs/op)", &recs).len(), 4);
}

#[test]
fn test_query_round_trip() {
    for query in [
        "a:b c:d OR e:f",
        "-(a:b OR c:d) e:f",
        "a:(x y z)",
        r#""key with space":"a(b)" AND x:"-y""#,
        "*",
        "-*",
    ] {
        let q = kvql::parse(query).unwrap();
        let rendered = q.to_string();
        let again = kvql::parse(&rendered).unwrap();
        assert_eq!(again.to_string(), rendered, "query {query:?}");
    }
}

#[test]
fn test_constructed_query() {
    let q = Query::and(vec![
        kvql::parse("goos:linux").unwrap(),
        Query::not(kvql::parse(".unit:B/op").unwrap()),
    ]);
    let filter = Filter::from_query(q).unwrap();
    assert!(filter.uses_units());

    let mut r = result("linux", "BenchmarkEncode", &["ns/op", "B/op"]);
    assert!(filter.match_record(&r).apply(&mut r));
    assert_eq!(r.values.len(), 1);
    assert_eq!(r.values[0].unit, "ns/op");
}

#[test]
fn test_syntax_errors_point_at_problem() {
    let err = Filter::new("goos:linux AND").unwrap_err();
    assert_eq!(err.offset, 14);
    assert_eq!(err.message, "nothing to match");

    let err = Filter::new("goos:linux Bad:x").unwrap_err();
    assert_eq!(err.offset, 11);
    assert_eq!(
        err.to_string(),
        "syntax error: expected .name, .fullname, /key, or file key: Bad\n\tgoos:linux Bad:x\n\t           ^"
    );

    let err = Filter::new(".bogus:x").unwrap_err();
    assert_eq!(err.offset, 0);
}
