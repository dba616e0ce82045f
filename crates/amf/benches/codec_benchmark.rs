use std::hint::black_box;

use amf::{AmfVersion, AsObject, SerializationContext, Value};
use criterion::{Criterion, criterion_group, criterion_main};

fn benchmark_codecs(c: &mut Criterion) {
    let context = SerializationContext::default();
    let value = create_record_graph(500);

    for version in [AmfVersion::Amf0, AmfVersion::Amf3] {
        let mut group = c.benchmark_group(format!("{version:?} Codec"));
        let bytes = amf::encode(&value, &context, version).unwrap();

        group.bench_function("Encode", |b| {
            b.iter(|| {
                amf::encode(black_box(&value), &context, version).unwrap();
            })
        });
        group.bench_function("Decode", |b| {
            b.iter(|| {
                amf::decode(black_box(bytes.clone()), &context, version).unwrap();
            })
        });

        group.finish();
    }
}

criterion_group!(benches, benchmark_codecs);
criterion_main!(benches);

/// Rows sharing one tag array and the same member names, so both the object
/// and string tables get exercised.
fn create_record_graph(rows: usize) -> Value {
    let tags = Value::array(vec![Value::from("live"), Value::from("hd")]);

    let records = (0..rows)
        .map(|i| {
            Value::from(AsObject::named("bench.Record").with_members(vec![
                ("id".into(), Value::Integer(i as i32)),
                ("title".into(), Value::from(format!("stream {i}"))),
                ("bitrate".into(), Value::Double(2_500.5)),
                ("started".into(), Value::date(1_700_000_000_000.0 + i as f64)),
                ("tags".into(), tags.clone()),
            ]))
        })
        .collect();

    Value::array(records)
}
