use criterion::{black_box, criterion_group, criterion_main, Criterion};
use staticprof::{analyze, BasicBlockBuilder, Function, Module, Options, Type};

/// A module of `num_functions` functions, each a counted loop whose body
/// calls the next function, so both propagation stages have work to do.
fn build_module(num_functions: usize) -> Module {
    let mut module = Module::new();

    let ids: Vec<_> = (0..num_functions)
        .map(|index| {
            let name = if index == 0 {
                "main".to_string()
            } else {
                format!("f{}", index)
            };
            module.add_function(Function::new(name))
        })
        .collect();

    for (index, &id) in ids.iter().enumerate() {
        let callee = ids.get(index + 1).copied();

        let func = module.function_mut(id);
        let entry = func.add_block();
        let header = func.add_block();
        let body = func.add_block();
        let exit = func.add_block();

        let mut builder = BasicBlockBuilder::new(func, entry);
        let address = builder.const_ptr(64);
        let count = builder.load(Type::Int32, address);
        let zero = builder.const32(0);
        let condition = builder.binary(staticprof::Opcode::GreaterThan, count, zero);
        builder.jump(header);
        builder.block = header;
        builder.branch(condition, body, exit);
        builder.block = body;
        if let Some(callee) = callee {
            builder.call(Type::Void, Some(callee), &[]);
        }
        builder.jump(header);
        builder.block = exit;
        builder.ret(None);
    }

    module
}

fn bench_analyze(c: &mut Criterion) {
    let module = build_module(64);

    c.bench_function("analyze 64 functions", |b| {
        b.iter(|| {
            let profile = analyze(black_box(&module), &Options::default()).unwrap();
            black_box(profile.function_frequency(staticprof::FuncId(0)));
        })
    });
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
