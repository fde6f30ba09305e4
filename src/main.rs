fn main() {
    stop_ambiguity::cli::run();
}
