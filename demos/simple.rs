use reactive_graph::*;

fn main() {
    create_root(|| {
        let data = cell(0);
        let doubled = derivation(move || data.get() * 2);
        let _obs = observer(move || {
            println!("data value changed. doubled value = {}", doubled.get());
        });
        data.set(1);
        data.set(2);
        data.set(3);
        data.set(4);
    });
}
