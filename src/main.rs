fn main() {
    std::process::exit(pomoboard::run());
}
