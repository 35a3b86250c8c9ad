use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dompart_core::{
    AlignmentData, Evidence, EvidenceType, Partitioner, ReferenceDefinitions, ReferenceDomain,
    SequenceRange,
};

fn generate_domain_hits(sequence_length: u32, count: u32) -> Vec<Evidence> {
    let step = sequence_length / count;

    (0..count * 3)
        .map(|i| {
            let start = 1 + (i * step / 3) % sequence_length;
            let end = (start + step + (i % 7) * 4).min(sequence_length);
            let query_range = SequenceRange::parse(&format!("{}-{}", start, end)).unwrap();
            let length = query_range.total_length() as u32;

            let mut evidence = Evidence::new(
                EvidenceType::DomainBlast,
                format!("{}bch", i),
                query_range,
                0.5 + (i % 10) as f64 * 0.045,
            );
            evidence.hit_range = Some(SequenceRange::parse(&format!("1-{}", length)).unwrap());
            evidence.reference_length = Some(length + (i % 5) * 10);
            evidence.evalue = Some(10f64.powi(-((i % 40) as i32)));
            evidence
        })
        .collect()
}

fn generate_chain_hit(sequence_length: u32, domains: u32) -> (Evidence, ReferenceDefinitions) {
    let step = sequence_length / domains;
    let refs: ReferenceDefinitions = (0..domains)
        .map(|i| {
            let range = SequenceRange::parse(&format!("{}-{}", i * step + 1, (i + 1) * step)).unwrap();
            ReferenceDomain {
                domain_id: format!("e9bchA{}", i + 1),
                source_id: "9bch".to_string(),
                chain: "A".to_string(),
                length: step,
                range,
                t_group: None,
                h_group: None,
            }
        })
        .collect();

    let seq: String = "ACDEFGHIKLMNPQRSTVWY"
        .chars()
        .cycle()
        .take(sequence_length as usize)
        .collect();
    let mut hit = Evidence::new(
        EvidenceType::ChainBlast,
        "9bch",
        SequenceRange::parse(&format!("1-{}", sequence_length)).unwrap(),
        0.9,
    );
    hit.source_chain = Some("A".to_string());
    hit.alignment = Some(AlignmentData {
        query_seq: seq.clone(),
        hit_seq: seq,
        query_start: 1,
        query_end: sequence_length,
        hit_start: 1,
        hit_end: sequence_length,
    });
    (hit, refs)
}

fn bench_domain_blast_partition(c: &mut Criterion) {
    let evidence = generate_domain_hits(1000, 10);
    let partitioner = Partitioner::default();

    c.bench_function("domain_blast_1000aa", |b| {
        b.iter(|| {
            let result = partitioner.partition(black_box(&evidence), 1000, None);
            black_box(result)
        })
    });
}

fn bench_chain_blast_decomposition(c: &mut Criterion) {
    let (hit, refs) = generate_chain_hit(2000, 8);
    let evidence = vec![hit];
    let partitioner = Partitioner::default();

    c.bench_function("chain_blast_2000aa_8_domains", |b| {
        b.iter(|| {
            let result = partitioner.partition(black_box(&evidence), 2000, Some(&refs));
            black_box(result)
        })
    });
}

criterion_group!(benches, bench_domain_blast_partition, bench_chain_blast_decomposition);
criterion_main!(benches);
