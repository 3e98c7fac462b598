use chat_history_core::{
    build_aggregate, resolve_store, AssetResolver, ExportConfig, RawRecord, ResolutionMode,
    SelectionPolicy, StoreName, StoreSnapshot, StoredVersion,
};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

fn mk_message(index: usize) -> RawRecord {
    let key = index % 250;
    let (content_type, content) = if index % 3 == 0 {
        ("file", format!("{{\"name\":\"report-{index}.pdf\",\"size\":{index}}}"))
    } else {
        ("text", format!("message body {index}\nsecond line"))
    };
    let stored = StoredVersion {
        key: None,
        value: json!({
            "gid": format!("m{key}"),
            "cgid": format!("c{}", key % 10),
            "user": key % 25,
            "date": 1_700_000_000_000_i64 + i64::try_from(key).unwrap_or(0),
            "contentType": content_type,
            "content": content,
        }),
        update_marker: Some(i64::try_from(index).unwrap_or(0)),
        deleted: index % 7 == 0,
    };
    match RawRecord::from_stored(StoreName::ChatMessage, index, stored) {
        Ok(record) => record,
        Err(err) => panic!("benchmark fixture should decode: {err}"),
    }
}

fn bench_resolve(c: &mut Criterion) {
    let records = (0..1_000).map(mk_message).collect::<Vec<_>>();

    c.bench_function("resolve_messages_1000_versions", |b| {
        b.iter(|| {
            let selected =
                resolve_store(&records, SelectionPolicy::PreferLive, ResolutionMode::Deduplicate);
            if selected.len() != 250 {
                panic!("resolver benchmark selected {} keys", selected.len());
            }
        });
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let snapshot = StoreSnapshot {
        messages: (0..1_000).map(mk_message).collect(),
        ..StoreSnapshot::default()
    };
    let assets = AssetResolver::new(std::env::temp_dir().join("chat-history-bench-no-assets"));
    let config = ExportConfig::default();

    c.bench_function("build_aggregate_1000_versions", |b| {
        b.iter(|| {
            let aggregate = build_aggregate("bench", &snapshot, &assets, &config);
            if aggregate.message_count == 0 {
                panic!("aggregate benchmark produced no messages");
            }
        });
    });
}

criterion_group!(resolver_benches, bench_resolve, bench_aggregate);
criterion_main!(resolver_benches);
